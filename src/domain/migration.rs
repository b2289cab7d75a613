//! Versioned migration manifests: path and config-key operations applied when
//! upgrading across releases.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::paths::clean_rel_path;
use super::version::{VersionTriplet, normalize_version};

pub const MIGRATION_SCHEMA_VERSION: u32 = 1;

/// One migration operation, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationAction {
    RenameFile { from: String, to: String },
    RenameGeneratedArtifact { from: String, to: String },
    DeleteFile { path: String },
    DeleteGeneratedArtifact { path: String },
    ConfigRenameKey { from_key: String, to_key: String },
    ConfigSetDefault { key: String, value: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOp {
    pub id: String,
    #[serde(flatten)]
    pub action: MigrationAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationManifest {
    pub schema_version: u32,
    pub target_version: String,
    pub min_prior_version: String,
    pub operations: Vec<MigrationOp>,
}

/// Split a dotted key path into components, rejecting empty ones.
pub fn parse_key_path(key: &str) -> Result<Vec<String>, String> {
    if key.is_empty() {
        return Err("key path is empty".to_string());
    }
    let parts: Vec<String> = key.split('.').map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(format!("key path '{}' contains an empty component", key));
    }
    Ok(parts)
}

fn validate_rel_path(field: &str, id: &str, path: &str) -> Result<(), String> {
    if path.is_empty() || clean_rel_path(path) != path {
        return Err(format!("op '{}' {field} '{}' is not a cleaned relative path", id, path));
    }
    Ok(())
}

impl MigrationOp {
    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("operation id is empty".to_string());
        }
        match &self.action {
            MigrationAction::RenameFile { from, to }
            | MigrationAction::RenameGeneratedArtifact { from, to } => {
                validate_rel_path("from", &self.id, from)?;
                validate_rel_path("to", &self.id, to)
            }
            MigrationAction::DeleteFile { path }
            | MigrationAction::DeleteGeneratedArtifact { path } => {
                validate_rel_path("path", &self.id, path)
            }
            MigrationAction::ConfigRenameKey { from_key, to_key } => {
                parse_key_path(from_key).map_err(|err| format!("op '{}': {err}", self.id))?;
                parse_key_path(to_key).map_err(|err| format!("op '{}': {err}", self.id))?;
                Ok(())
            }
            MigrationAction::ConfigSetDefault { key, .. } => {
                parse_key_path(key).map_err(|err| format!("op '{}': {err}", self.id))?;
                Ok(())
            }
        }
    }
}

impl MigrationManifest {
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != MIGRATION_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, MIGRATION_SCHEMA_VERSION
            ));
        }
        let target = match normalize_version(&self.target_version) {
            Some(normalized) if normalized == self.target_version => {
                VersionTriplet::parse(&self.target_version).unwrap()
            }
            _ => {
                return Err(format!(
                    "target_version '{}' is not normalized semver",
                    self.target_version
                ));
            }
        };
        let min_prior = match normalize_version(&self.min_prior_version) {
            Some(normalized) if normalized == self.min_prior_version => {
                VersionTriplet::parse(&self.min_prior_version).unwrap()
            }
            _ => {
                return Err(format!(
                    "min_prior_version '{}' is not normalized semver",
                    self.min_prior_version
                ));
            }
        };
        if min_prior >= target {
            return Err(format!(
                "min_prior_version '{}' must precede target_version '{}'",
                self.min_prior_version, self.target_version
            ));
        }

        let mut seen = BTreeSet::new();
        for op in &self.operations {
            op.validate()?;
            if !seen.insert(op.id.as_str()) {
                return Err(format!("duplicate operation id '{}'", op.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(operations: Vec<MigrationOp>) -> MigrationManifest {
        MigrationManifest {
            schema_version: 1,
            target_version: "0.4.0".to_string(),
            min_prior_version: "0.3.0".to_string(),
            operations,
        }
    }

    #[test]
    fn tagged_ops_decode_from_json() {
        let json = r#"{
            "schema_version": 1,
            "target_version": "0.4.0",
            "min_prior_version": "0.3.0",
            "operations": [
                {"id": "rename-find-issues", "kind": "rename_file",
                 "from": ".agent-layer/slash-commands/find-issues-legacy.md",
                 "to": ".agent-layer/slash-commands/find-issues.md"},
                {"id": "default-schema", "kind": "config_set_default",
                 "key": "schema_version", "value": 1}
            ]
        }"#;
        let manifest: MigrationManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.validate(), Ok(()));
        assert!(matches!(manifest.operations[0].action, MigrationAction::RenameFile { .. }));
        assert!(matches!(
            manifest.operations[1].action,
            MigrationAction::ConfigSetDefault { .. }
        ));
    }

    #[test]
    fn duplicate_op_ids_are_rejected() {
        let op = MigrationOp {
            id: "dup".to_string(),
            action: MigrationAction::DeleteFile { path: ".agent-layer/old.md".to_string() },
        };
        let bad = manifest(vec![op.clone(), op]);
        assert!(bad.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn key_paths_reject_empty_components() {
        assert!(parse_key_path("agents..vscode").is_err());
        assert!(parse_key_path("").is_err());
        assert_eq!(
            parse_key_path("agents.vscode.enabled").unwrap(),
            vec!["agents", "vscode", "enabled"]
        );
    }

    #[test]
    fn min_prior_must_precede_target() {
        let mut bad = manifest(Vec::new());
        bad.min_prior_version = "0.4.0".to_string();
        assert!(bad.validate().is_err());
    }
}
