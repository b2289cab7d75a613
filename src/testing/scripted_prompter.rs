//! Scripted `Prompter` for tests: canned answers plus a call log.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::domain::AppError;
use crate::domain::plan::DiffPreview;
use crate::ports::{Prompter, PrompterCapabilities};

#[derive(Debug)]
pub struct ScriptedPrompter {
    capabilities: PrompterCapabilities,
    pub overwrite_answer: bool,
    pub overwrite_memory_answer: bool,
    pub delete_all_answer: bool,
    per_path_delete: BTreeMap<String, bool>,
    pub calls: RefCell<Vec<String>>,
}

impl Default for ScriptedPrompter {
    fn default() -> Self {
        ScriptedPrompter {
            capabilities: PrompterCapabilities::all(),
            overwrite_answer: true,
            overwrite_memory_answer: true,
            delete_all_answer: false,
            per_path_delete: BTreeMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ScriptedPrompter {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn with_capabilities(mut self, capabilities: PrompterCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_delete_all(mut self, answer: bool) -> Self {
        self.delete_all_answer = answer;
        self
    }

    pub fn with_delete_answer(mut self, path: &str, answer: bool) -> Self {
        self.per_path_delete.insert(path.to_string(), answer);
        self
    }

    pub fn with_overwrite(mut self, answer: bool) -> Self {
        self.overwrite_answer = answer;
        self
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl Prompter for ScriptedPrompter {
    fn capabilities(&self) -> PrompterCapabilities {
        self.capabilities
    }

    fn overwrite_all(&self, previews: &[DiffPreview]) -> Result<bool, AppError> {
        self.record(format!("overwrite_all:{}", previews.len()));
        Ok(self.overwrite_answer)
    }

    fn overwrite_all_memory(&self, previews: &[DiffPreview]) -> Result<bool, AppError> {
        self.record(format!("overwrite_all_memory:{}", previews.len()));
        Ok(self.overwrite_memory_answer)
    }

    fn delete_unknown_all(&self, paths: &[String]) -> Result<bool, AppError> {
        self.record(format!("delete_unknown_all:{}", paths.len()));
        Ok(self.delete_all_answer)
    }

    fn delete_unknown(&self, path: &str) -> Result<bool, AppError> {
        self.record(format!("delete_unknown:{path}"));
        Ok(self.per_path_delete.get(path).copied().unwrap_or(false))
    }
}
