//! Ports: interface boundaries between the engine and its collaborators.

pub mod prompter;
pub mod system;
pub mod template_source;

pub use prompter::{Prompter, PrompterCapabilities};
pub use system::{FileInfo, FileKind, System};
pub use template_source::TemplateSource;
