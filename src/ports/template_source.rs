//! Embedded template tree abstraction.

use crate::domain::AppError;

/// Port over the embedded template tree.
///
/// Paths are repo-relative with forward slashes. Iteration is lexicographic.
/// Both operations are test-overridable; the embedded adapter never yields
/// manifest or migration assets through `walk`.
pub trait TemplateSource {
    /// Visit every template file whose path is `root` or sits below it.
    /// An empty `root` visits the whole tree.
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<(), AppError>,
    ) -> Result<(), AppError>;

    /// Read one template file's bytes.
    fn read(&self, path: &str) -> Result<Vec<u8>, AppError>;
}
