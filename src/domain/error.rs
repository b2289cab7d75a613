use std::io;

/// Library-wide error type for agent-layer operations.
///
/// Mutating phases map every failure into one of these variants so the
/// installer can match on them exhaustively when deciding rollback behavior.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Underlying I/O failure, wrapped with the attempted action and path.
    #[error("failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    /// Caller-supplied input rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// A persisted or embedded document failed to decode or validate.
    #[error("invalid {what} '{path}': {reason}")]
    Schema { what: &'static str, path: String, reason: String },

    /// Embedded asset expected at compile time is missing or unreadable.
    #[error("missing embedded asset: {0}")]
    MissingAsset(String),

    /// Overwrite mode was requested without the prompter callbacks it needs.
    #[error("overwrite mode requires a prompter with {0}")]
    PrompterRequired(&'static str),

    /// A migration operation could not be applied without losing content.
    #[error("migration op '{op_id}' failed: {reason}")]
    MigrationConflict { op_id: String, reason: String },

    /// A mutating run failed and the snapshot restore failed as well.
    /// Carries both errors so neither is lost.
    #[error("run failed during {step} ({error}); rollback also failed: {rollback_error}")]
    RollbackFailed { step: String, error: String, rollback_error: String },
}

impl AppError {
    pub fn io(action: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        AppError::Io { action, path: path.into(), source }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn schema(what: &'static str, path: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Schema { what, path: path.into(), reason: reason.into() }
    }

    /// Whether this error wraps an I/O `NotFound`.
    ///
    /// Phases that treat missing files as a local no-op check this instead of
    /// surfacing the error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
