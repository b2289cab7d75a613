//! Ownership classification: given the local bytes, the best baseline
//! evidence, and the target template, decide whether a changed file is an
//! upstream template delta the engine may overwrite, a local customization it
//! must preserve, or an unknown.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::comparable::{OwnershipComparable, build_ownership_comparable};
use super::policy::PolicyId;

/// Closed set of classifier reason codes.
pub mod reason {
    pub const BASELINE_MISSING: &str = "baseline_missing";
    pub const PIN_MANIFEST_MISSING: &str = "pin_manifest_missing";
    pub const MANAGED_SECTION_MATCHES_PINNED: &str = "managed_section_matches_pinned";
    pub const MANAGED_SECTION_MATCHES_OTHER_VERSION: &str =
        "managed_section_matches_other_version";
    pub const SECTION_MARKER_MISSING: &str = "section_marker_missing";
    pub const SECTION_MARKER_AMBIGUOUS: &str = "section_marker_ambiguous";
    pub const ALLOWLIST_REORDERED_ONLY: &str = "allowlist_reordered_only";
    pub const ALLOWLIST_UPSTREAM_LINE_DELTA: &str = "allowlist_upstream_line_delta";
    pub const ALLOWLIST_LOCAL_LINE_DELTA: &str = "allowlist_local_line_delta";
    pub const POLICY_PAYLOAD_INVALID: &str = "policy_payload_invalid";
    pub const POLICY_MISMATCH: &str = "policy_mismatch";
}

/// Human-facing ownership label for a changed managed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipLabel {
    #[serde(rename = "upstream_template_delta")]
    UpstreamTemplateDelta,
    #[serde(rename = "local_customization")]
    LocalCustomization,
    #[serde(rename = "unknown_no_baseline")]
    UnknownNoBaseline,
}

/// Machine state parallel to [`OwnershipLabel`], kept distinct so plan
/// consumers can match on state without caring about display concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipState {
    #[serde(rename = "UpstreamTemplateDelta")]
    UpstreamTemplateDelta,
    #[serde(rename = "LocalCustomization")]
    LocalCustomization,
    #[serde(rename = "UnknownNoBaseline")]
    UnknownNoBaseline,
}

impl OwnershipLabel {
    pub fn state(self) -> OwnershipState {
        match self {
            OwnershipLabel::UpstreamTemplateDelta => OwnershipState::UpstreamTemplateDelta,
            OwnershipLabel::LocalCustomization => OwnershipState::LocalCustomization,
            OwnershipLabel::UnknownNoBaseline => OwnershipState::UnknownNoBaseline,
        }
    }
}

/// How much trust the baseline evidence carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
}

/// Where a baseline (or baseline state file) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineSource {
    #[serde(rename = "written_by_init")]
    WrittenByInit,
    #[serde(rename = "written_by_overwrite")]
    WrittenByOverwrite,
    #[serde(rename = "written_by_upgrade")]
    WrittenByUpgrade,
    #[serde(rename = "inferred_from_pin_manifest")]
    InferredFromPinManifest,
    #[serde(rename = "migrated_from_legacy_docs_snapshot")]
    MigratedFromLegacyDocsSnapshot,
}

impl BaselineSource {
    /// Confidence implied by the evidence source: written state files are
    /// trusted, pin-manifest inference less so, legacy snapshots least.
    pub fn confidence(self) -> Confidence {
        match self {
            BaselineSource::WrittenByInit
            | BaselineSource::WrittenByOverwrite
            | BaselineSource::WrittenByUpgrade => Confidence::High,
            BaselineSource::InferredFromPinManifest => Confidence::Medium,
            BaselineSource::MigratedFromLegacyDocsSnapshot => Confidence::Low,
        }
    }
}

/// The best baseline evidence the store could resolve for a path.
#[derive(Debug, Clone, Default)]
pub struct BaselineEvidence {
    pub comparable: Option<OwnershipComparable>,
    /// Reason codes seeded during resolution (e.g. `baseline_missing`,
    /// `managed_section_matches_other_version`).
    pub reasons: Vec<String>,
    pub confidence: Option<Confidence>,
    pub source: Option<BaselineSource>,
}

impl BaselineEvidence {
    pub fn available(&self) -> bool {
        self.comparable.is_some()
    }

    pub fn unavailable(reason_code: &str) -> Self {
        BaselineEvidence { reasons: vec![reason_code.to_string()], ..Default::default() }
    }
}

/// Classifier output for a path whose content differs from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipAssessment {
    pub label: OwnershipLabel,
    pub state: OwnershipState,
    pub confidence: Option<Confidence>,
    pub baseline_source: Option<BaselineSource>,
    /// Sorted, deduplicated, never empty strings.
    pub reason_codes: Vec<String>,
}

impl OwnershipAssessment {
    fn new(
        label: OwnershipLabel,
        confidence: Option<Confidence>,
        baseline_source: Option<BaselineSource>,
        reasons: Vec<String>,
    ) -> Self {
        OwnershipAssessment {
            label,
            state: label.state(),
            confidence,
            baseline_source,
            reason_codes: finalize_reasons(reasons),
        }
    }
}

/// Sort, dedup, and drop empty reason codes.
pub fn finalize_reasons(reasons: Vec<String>) -> Vec<String> {
    let set: BTreeSet<String> = reasons.into_iter().filter(|code| !code.is_empty()).collect();
    set.into_iter().collect()
}

/// Classify a managed path.
///
/// Returns `None` when the local content is semantically equal to both the
/// baseline and the target under policy, i.e. there is nothing to report.
pub fn classify(
    policy: PolicyId,
    local_bytes: &[u8],
    baseline: &BaselineEvidence,
    target: Option<&OwnershipComparable>,
) -> Option<OwnershipAssessment> {
    let mut reasons = baseline.reasons.clone();

    let local = match build_ownership_comparable(policy, local_bytes) {
        Ok(local) => local,
        Err(err) => {
            reasons.push(err.reason_code().to_string());
            return Some(OwnershipAssessment::new(
                OwnershipLabel::UnknownNoBaseline,
                None,
                None,
                reasons,
            ));
        }
    };

    let Some(base) = baseline.comparable.as_ref() else {
        if reasons.is_empty() {
            reasons.push(reason::BASELINE_MISSING.to_string());
        }
        return Some(OwnershipAssessment::new(
            OwnershipLabel::UnknownNoBaseline,
            None,
            None,
            reasons,
        ));
    };

    if base.policy != local.policy {
        reasons.push(reason::POLICY_MISMATCH.to_string());
        return Some(OwnershipAssessment::new(
            OwnershipLabel::UnknownNoBaseline,
            None,
            None,
            reasons,
        ));
    }

    let local_key = local.comparable_key();
    let base_key = base.comparable_key();
    let target_key = target.map(OwnershipComparable::comparable_key);

    augment_reasons(policy, &local, base, target, &mut reasons);

    let label = if local_key == base_key {
        if Some(local_key) == target_key {
            return None;
        }
        OwnershipLabel::UpstreamTemplateDelta
    } else if Some(local_key) == target_key {
        OwnershipLabel::UpstreamTemplateDelta
    } else {
        OwnershipLabel::LocalCustomization
    };

    Some(OwnershipAssessment::new(label, baseline.confidence, baseline.source, reasons))
}

fn augment_reasons(
    policy: PolicyId,
    local: &OwnershipComparable,
    base: &OwnershipComparable,
    target: Option<&OwnershipComparable>,
    reasons: &mut Vec<String>,
) {
    match policy {
        PolicyId::AllowlistLinesV1 => {
            let empty = BTreeSet::new();
            let local_set = local.allow_set.as_ref().unwrap_or(&empty);
            let base_set = base.allow_set.as_ref().unwrap_or(&empty);

            if local_set == base_set && local.full_hash != base.full_hash {
                reasons.push(reason::ALLOWLIST_REORDERED_ONLY.to_string());
            }
            if let Some(target) = target
                && let Some(target_set) = target.allow_set.as_ref()
                && target_set.difference(base_set).next().is_some()
            {
                reasons.push(reason::ALLOWLIST_UPSTREAM_LINE_DELTA.to_string());
            }
            if local_set.difference(base_set).next().is_some() {
                reasons.push(reason::ALLOWLIST_LOCAL_LINE_DELTA.to_string());
            }
        }
        PolicyId::MemoryEntriesV1 | PolicyId::MemoryRoadmapV1 => {
            if local.managed_hash.is_some() && local.managed_hash == base.managed_hash {
                reasons.push(reason::MANAGED_SECTION_MATCHES_PINNED.to_string());
            }
        }
        PolicyId::FullFile => {}
    }
}
