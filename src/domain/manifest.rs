//! Per-version template manifest: the record of what the engine shipped at a
//! given release, used as baseline evidence during upgrades.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::comparable::{OwnershipComparable, allowlist_canonical, hash_content};
use super::paths::clean_rel_path;
use super::policy::PolicyId;
use super::version::normalize_version;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Policy-specific manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyPayload {
    Memory { marker: String, managed_section_hash: String },
    Allowlist { upstream_set: Vec<String>, upstream_set_hash: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    pub path: String,
    pub full_hash_normalized: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_payload: Option<PolicyPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateManifest {
    pub schema_version: u32,
    /// Normalized `X.Y.Z`; must equal the manifest file's name stem.
    pub version: String,
    /// RFC3339 UTC timestamp of manifest generation.
    pub generated_at_utc: String,
    pub files: Vec<ManifestFileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn is_hex_hash(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

impl ManifestFileEntry {
    /// The effective policy for this entry.
    pub fn policy(&self) -> PolicyId {
        self.policy_id.unwrap_or(PolicyId::FullFile)
    }

    /// Validate the entry shape and its policy payload.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() || clean_rel_path(&self.path) != self.path {
            return Err(format!("entry path '{}' is not a cleaned relative path", self.path));
        }
        if !is_hex_hash(&self.full_hash_normalized) {
            return Err(format!(
                "entry '{}' full_hash_normalized is not a lowercase sha-256 hex digest",
                self.path
            ));
        }

        match (self.policy(), &self.policy_payload) {
            (PolicyId::FullFile, None) => Ok(()),
            (PolicyId::FullFile, Some(_)) => {
                Err(format!("entry '{}' carries a payload for full_file policy", self.path))
            }
            (
                PolicyId::MemoryEntriesV1 | PolicyId::MemoryRoadmapV1,
                Some(PolicyPayload::Memory { marker, managed_section_hash }),
            ) => {
                let expected = self.policy().section_marker().unwrap_or_default();
                if marker != expected {
                    return Err(format!(
                        "entry '{}' marker '{}' does not match policy marker '{}'",
                        self.path, marker, expected
                    ));
                }
                if !is_hex_hash(managed_section_hash) {
                    return Err(format!(
                        "entry '{}' managed_section_hash is not a lowercase sha-256 hex digest",
                        self.path
                    ));
                }
                Ok(())
            }
            (
                PolicyId::AllowlistLinesV1,
                Some(PolicyPayload::Allowlist { upstream_set, upstream_set_hash }),
            ) => {
                if upstream_set.is_empty() {
                    return Err(format!("entry '{}' upstream_set is empty", self.path));
                }
                let deduped: BTreeSet<&String> = upstream_set.iter().collect();
                if deduped.len() != upstream_set.len() {
                    return Err(format!("entry '{}' upstream_set contains duplicates", self.path));
                }
                let sorted: BTreeSet<String> = upstream_set.iter().cloned().collect();
                let expected = hash_content(&allowlist_canonical(&sorted));
                if *upstream_set_hash != expected {
                    return Err(format!(
                        "entry '{}' upstream_set_hash does not match its set",
                        self.path
                    ));
                }
                Ok(())
            }
            (policy, payload) => Err(format!(
                "entry '{}' payload does not match policy '{}' (payload present: {})",
                self.path,
                policy.as_str(),
                payload.is_some()
            )),
        }
    }

    /// Build the baseline comparable this entry describes.
    ///
    /// Fails with a reason string when the payload is invalid for the policy;
    /// the resolver maps that onto `policy_payload_invalid`.
    pub fn baseline_comparable(&self) -> Result<OwnershipComparable, String> {
        self.validate()?;
        let (managed_hash, allow_set, allow_hash) = match &self.policy_payload {
            Some(PolicyPayload::Memory { managed_section_hash, .. }) => {
                (Some(managed_section_hash.clone()), None, None)
            }
            Some(PolicyPayload::Allowlist { upstream_set, upstream_set_hash }) => {
                let set: BTreeSet<String> = upstream_set.iter().cloned().collect();
                (None, Some(set), Some(upstream_set_hash.clone()))
            }
            None => (None, None, None),
        };
        Ok(OwnershipComparable {
            policy: self.policy(),
            full_hash: self.full_hash_normalized.clone(),
            managed_hash,
            allow_set,
            allow_hash,
        })
    }
}

impl TemplateManifest {
    /// Validate the whole manifest: schema version, normalized semver,
    /// RFC3339 timestamp, unique paths, and every entry.
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

        let mut seen = BTreeSet::new();
        for entry in &self.files {
            entry.validate()?;
            if !seen.insert(entry.path.as_str()) {
                return Err(format!("duplicate manifest entry for '{}'", entry.path));
            }
        }
        Ok(())
    }

    pub fn entry_for(&self, rel_path: &str) -> Option<&ManifestFileEntry> {
        self.files.iter().find(|entry| entry.path == rel_path)
    }
}
