//! Upgrade snapshot: the captured pre-state of every path a mutating run may
//! touch, used solely for rollback.

use std::collections::BTreeSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::paths::clean_rel_path;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "applied")]
    Applied,
    #[serde(rename = "auto_rolled_back")]
    AutoRolledBack,
    #[serde(rename = "manually_rolled_back")]
    ManuallyRolledBack,
    #[serde(rename = "rollback_failed")]
    RollbackFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotEntryKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "dir")]
    Dir,
    #[serde(rename = "absent")]
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub kind: SnapshotEntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

impl SnapshotEntry {
    pub fn absent(path: impl Into<String>) -> Self {
        SnapshotEntry { path: path.into(), kind: SnapshotEntryKind::Absent, perm: None, content_base64: None }
    }

    pub fn dir(path: impl Into<String>, perm: u32) -> Self {
        SnapshotEntry {
            path: path.into(),
            kind: SnapshotEntryKind::Dir,
            perm: Some(perm),
            content_base64: None,
        }
    }

    pub fn file(path: impl Into<String>, perm: u32, content: &[u8]) -> Self {
        SnapshotEntry {
            path: path.into(),
            kind: SnapshotEntryKind::File,
            perm: Some(perm),
            content_base64: Some(BASE64.encode(content)),
        }
    }

    /// Decode the captured file content. Only meaningful for `file` entries.
    pub fn decoded_content(&self) -> Result<Vec<u8>, String> {
        let encoded = self
            .content_base64
            .as_ref()
            .ok_or_else(|| format!("entry '{}' has no content", self.path))?;
        BASE64
            .decode(encoded)
            .map_err(|err| format!("entry '{}' content is not valid base64: {}", self.path, err))
    }

    fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() || clean_rel_path(&self.path) != self.path {
            return Err(format!("entry path '{}' is not a cleaned relative path", self.path));
        }
        match self.kind {
            SnapshotEntryKind::Absent => {
                if self.perm.is_some() || self.content_base64.is_some() {
                    return Err(format!("absent entry '{}' must carry no perm or content", self.path));
                }
            }
            SnapshotEntryKind::Dir => {
                if self.content_base64.is_some() {
                    return Err(format!("dir entry '{}' must carry no content", self.path));
                }
            }
            SnapshotEntryKind::File => {
                self.decoded_content()?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSnapshot {
    pub schema_version: u32,
    pub snapshot_id: String,
    pub created_at_utc: String,
    pub status: SnapshotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_error: Option<String>,
    pub entries: Vec<SnapshotEntry>,
}

impl UpgradeSnapshot {
    /// Validate the snapshot. A prerequisite for both reading and writing.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }
        if self.snapshot_id.is_empty() {
            return Err("snapshot_id is empty".to_string());
        }
        if chrono::DateTime::parse_from_rfc3339(&self.created_at_utc).is_err() {
            return Err(format!("created_at_utc '{}' is not RFC3339", self.created_at_utc));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            entry.validate()?;
            if !seen.insert(entry.path.as_str()) {
                return Err(format!("duplicate snapshot entry for '{}'", entry.path));
            }
        }
        Ok(())
    }
}
