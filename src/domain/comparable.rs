//! Content normalization, hashing, and the policy-specific canonical form
//! every ownership comparison runs on.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use super::policy::PolicyId;

/// Replace `\r\n` and bare `\r` with `\n`.
pub fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// SHA-256 of the given content, hex-encoded, lowercase.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Hash of the normalized form of raw bytes. Non-UTF-8 input is replaced
/// lossily before normalization.
pub fn hash_normalized(bytes: &[u8]) -> String {
    hash_content(&normalize(&String::from_utf8_lossy(bytes)))
}

/// Why a policy rejected the local bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparableError {
    SectionMarkerMissing,
    SectionMarkerAmbiguous,
}

impl ComparableError {
    pub fn reason_code(self) -> &'static str {
        match self {
            ComparableError::SectionMarkerMissing => "section_marker_missing",
            ComparableError::SectionMarkerAmbiguous => "section_marker_ambiguous",
        }
    }
}

/// Policy-specific canonical form derived from raw bytes.
///
/// Equality of `comparable_key` under a policy is the engine's definition of
/// "same file".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipComparable {
    pub policy: PolicyId,
    /// Hash of the full normalized content.
    pub full_hash: String,
    /// For section policies: hash of the lines up to and including the marker.
    pub managed_hash: Option<String>,
    /// For allowlist: sorted, deduplicated non-comment non-blank lines.
    pub allow_set: Option<BTreeSet<String>>,
    /// For allowlist: hash of the canonical newline-terminated set form.
    pub allow_hash: Option<String>,
}

impl OwnershipComparable {
    /// The policy-significant hash: managed-section hash for section
    /// policies, allowlist hash for allowlists, full hash otherwise.
    pub fn comparable_key(&self) -> &str {
        match self.policy {
            PolicyId::MemoryEntriesV1 | PolicyId::MemoryRoadmapV1 => {
                self.managed_hash.as_deref().unwrap_or(&self.full_hash)
            }
            PolicyId::AllowlistLinesV1 => self.allow_hash.as_deref().unwrap_or(&self.full_hash),
            PolicyId::FullFile => &self.full_hash,
        }
    }
}

/// Build the comparable for raw bytes under a policy.
pub fn build_ownership_comparable(
    policy: PolicyId,
    bytes: &[u8],
) -> Result<OwnershipComparable, ComparableError> {
    let normalized = normalize(&String::from_utf8_lossy(bytes));
    let full_hash = hash_content(&normalized);

    match policy {
        PolicyId::FullFile => Ok(OwnershipComparable {
            policy,
            full_hash,
            managed_hash: None,
            allow_set: None,
            allow_hash: None,
        }),
        PolicyId::MemoryEntriesV1 | PolicyId::MemoryRoadmapV1 => {
            let marker = policy.section_marker().unwrap_or_default();
            let managed = extract_managed_section(&normalized, marker)?;
            Ok(OwnershipComparable {
                policy,
                full_hash,
                managed_hash: Some(hash_content(&managed)),
                allow_set: None,
                allow_hash: None,
            })
        }
        PolicyId::AllowlistLinesV1 => {
            let set = allowlist_set(&normalized);
            let allow_hash = hash_content(&allowlist_canonical(&set));
            Ok(OwnershipComparable {
                policy,
                full_hash,
                managed_hash: None,
                allow_set: Some(set),
                allow_hash: Some(allow_hash),
            })
        }
    }
}

/// Extract the managed section: the prefix through and including the marker
/// line, re-joined with `\n` terminators.
///
/// The marker must appear as a standalone trimmed line exactly once.
pub fn extract_managed_section(
    normalized: &str,
    marker: &str,
) -> Result<String, ComparableError> {
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut marker_index = None;
    for (index, line) in lines.iter().enumerate() {
        if line.trim() == marker {
            if marker_index.is_some() {
                return Err(ComparableError::SectionMarkerAmbiguous);
            }
            marker_index = Some(index);
        }
    }

    let index = marker_index.ok_or(ComparableError::SectionMarkerMissing)?;
    let mut section = String::new();
    for line in &lines[..=index] {
        section.push_str(line);
        section.push('\n');
    }
    Ok(section)
}

/// Tokenize an allowlist: trimmed lines, blanks and `#` comments dropped,
/// first occurrence retained, sorted ASCIIbetically.
pub fn allowlist_set(normalized: &str) -> BTreeSet<String> {
    normalized
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Canonical newline-terminated concatenation of an allowlist set.
pub fn allowlist_canonical(set: &BTreeSet<String>) -> String {
    let mut canonical = String::new();
    for line in set {
        canonical.push_str(line);
        canonical.push('\n');
    }
    canonical
}
