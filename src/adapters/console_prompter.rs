//! `Prompter` implementation over interactive terminal confirmation.

use dialoguer::Confirm;

use crate::domain::AppError;
use crate::domain::plan::DiffPreview;
use crate::ports::{Prompter, PrompterCapabilities};

/// Interactive prompter used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        ConsolePrompter
    }

    fn confirm(&self, prompt: String) -> Result<bool, AppError> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|err| AppError::validation(format!("prompt failed: {err}")))
    }
}

impl Prompter for ConsolePrompter {
    fn capabilities(&self) -> PrompterCapabilities {
        PrompterCapabilities::all()
    }

    fn overwrite_all(&self, previews: &[DiffPreview]) -> Result<bool, AppError> {
        for preview in previews {
            println!("  will overwrite {}", preview.path);
        }
        self.confirm(format!("Overwrite {} managed file(s)?", previews.len()))
    }

    fn overwrite_all_memory(&self, previews: &[DiffPreview]) -> Result<bool, AppError> {
        for preview in previews {
            println!("  will rewrite managed section of {}", preview.path);
        }
        self.confirm(format!("Rewrite {} memory document(s)?", previews.len()))
    }

    fn delete_unknown_all(&self, paths: &[String]) -> Result<bool, AppError> {
        for path in paths {
            println!("  unknown file {}", path);
        }
        self.confirm(format!("Delete all {} unknown file(s)?", paths.len()))
    }

    fn delete_unknown(&self, path: &str) -> Result<bool, AppError> {
        self.confirm(format!("Delete unknown file '{}'?", path))
    }
}
