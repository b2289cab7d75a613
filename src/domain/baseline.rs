//! Persisted managed-baseline state: the last-known managed content for every
//! path, written only after a run whose diffs are (or just became) empty.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::manifest::{MANIFEST_SCHEMA_VERSION, ManifestFileEntry};
use super::ownership::BaselineSource;
use super::version::normalize_version;

/// Managed baseline state, persisted at `.agent-layer/state/managed-baseline.json`.
///
/// Same shape as a template manifest plus provenance fields. `created_at_utc`
/// persists across overwrites; `updated_at_utc` moves with every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineState {
    pub schema_version: u32,
    pub version: String,
    pub generated_at_utc: String,
    pub files: Vec<ManifestFileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub source: BaselineSource,
    pub created_at_utc: String,
    pub updated_at_utc: String,
}

impl BaselineState {
    /// Validate the persisted shape.
    ///
    /// A blank `created_at_utc` is tolerated here; the writer replaces it with
    /// the current time on the next write.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, MANIFEST_SCHEMA_VERSION
            ));
        }
        match normalize_version(&self.version) {
            Some(normalized) if normalized == self.version => {}
            _ => return Err(format!("version '{}' is not normalized semver", self.version)),
        }
        if chrono::DateTime::parse_from_rfc3339(&self.generated_at_utc).is_err() {
            return Err(format!("generated_at_utc '{}' is not RFC3339", self.generated_at_utc));
        }
        if !self.created_at_utc.is_empty()
            && chrono::DateTime::parse_from_rfc3339(&self.created_at_utc).is_err()
        {
            return Err(format!("created_at_utc '{}' is not RFC3339", self.created_at_utc));
        }
        if chrono::DateTime::parse_from_rfc3339(&self.updated_at_utc).is_err() {
            return Err(format!("updated_at_utc '{}' is not RFC3339", self.updated_at_utc));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.files {
            entry.validate()?;
            if !seen.insert(entry.path.as_str()) {
                return Err(format!("duplicate baseline entry for '{}'", entry.path));
            }
        }
        Ok(())
    }

    pub fn entry_for(&self, rel_path: &str) -> Option<&ManifestFileEntry> {
        self.files.iter().find(|entry| entry.path == rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::comparable::hash_content;

    fn state() -> BaselineState {
        BaselineState {
            schema_version: 1,
            version: "0.4.0".to_string(),
            generated_at_utc: "2026-07-01T00:00:00Z".to_string(),
            files: vec![ManifestFileEntry {
                path: ".agent-layer/instructions/core.md".to_string(),
                full_hash_normalized: hash_content("core\n"),
                policy_id: None,
                policy_payload: None,
            }],
            metadata: None,
            source: BaselineSource::WrittenByInit,
            created_at_utc: "2026-07-01T00:00:00Z".to_string(),
            updated_at_utc: "2026-07-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn valid_state_passes() {
        assert_eq!(state().validate(), Ok(()));
    }

    #[test]
    fn blank_created_at_is_tolerated() {
        let mut blank = state();
        blank.created_at_utc = String::new();
        assert_eq!(blank.validate(), Ok(()));
    }

    #[test]
    fn malformed_updated_at_is_rejected() {
        let mut bad = state();
        bad.updated_at_utc = "yesterday".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn source_round_trips_through_json() {
        let json = serde_json::to_string(&state()).unwrap();
        assert!(json.contains("\"written_by_init\""));
        let back: BaselineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, BaselineSource::WrittenByInit);
    }
}
