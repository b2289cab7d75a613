//! User-intent prompts consumed in overwrite mode.

use crate::domain::AppError;
use crate::domain::plan::DiffPreview;

/// Which prompt callbacks an implementation actually carries.
///
/// Overwrite mode requires the overwrite pair; unknown-path deletion requires
/// the deletion pair. A missing required capability is a fatal configuration
/// error, never a silent skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrompterCapabilities {
    pub overwrite: bool,
    pub overwrite_memory: bool,
    pub delete_unknown_all: bool,
    pub delete_unknown: bool,
}

impl PrompterCapabilities {
    pub fn all() -> Self {
        PrompterCapabilities {
            overwrite: true,
            overwrite_memory: true,
            delete_unknown_all: true,
            delete_unknown: true,
        }
    }
}

/// Port for interactive confirmation.
pub trait Prompter {
    fn capabilities(&self) -> PrompterCapabilities;

    /// Confirm overwriting every managed (non-memory) file in `previews`.
    fn overwrite_all(&self, previews: &[DiffPreview]) -> Result<bool, AppError>;

    /// Confirm overwriting the section-policy memory documents in `previews`.
    fn overwrite_all_memory(&self, previews: &[DiffPreview]) -> Result<bool, AppError>;

    /// Offer deleting every unknown path at once.
    fn delete_unknown_all(&self, paths: &[String]) -> Result<bool, AppError>;

    /// Offer deleting a single unknown path.
    fn delete_unknown(&self, path: &str) -> Result<bool, AppError>;
}
