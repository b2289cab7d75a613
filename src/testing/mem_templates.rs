//! In-memory `TemplateSource` for tests.

use std::collections::BTreeMap;

use crate::domain::AppError;
use crate::ports::TemplateSource;

#[derive(Debug, Clone, Default)]
pub struct MemTemplates {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }

    pub fn add_file(&mut self, path: &str, bytes: &[u8]) {
        self.files.insert(path.to_string(), bytes.to_vec());
    }
}

impl TemplateSource for MemTemplates {
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        for (path, bytes) in &self.files {
            if root.is_empty() || path == root || path.starts_with(&format!("{root}/")) {
                visit(path, bytes)?;
            }
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, AppError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::MissingAsset(path.to_string()))
    }
}
