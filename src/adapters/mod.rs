//! Adapters: concrete implementations of the ports.

pub mod console_prompter;
pub mod embedded_templates;
pub mod os_system;

pub use console_prompter::ConsolePrompter;
pub use embedded_templates::{EmbeddedTemplates, embedded_manifests, embedded_migrations};
pub use os_system::OsSystem;
