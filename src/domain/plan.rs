//! Dry-run upgrade plan: the planner's output. A plan never mutates on-disk
//! state; every list is sorted by path so output is deterministic.

use serde::{Deserialize, Serialize};

use super::ownership::{BaselineSource, Confidence, OwnershipAssessment, OwnershipLabel, OwnershipState};
use super::readiness::ReadinessFinding;

pub const PLAN_SCHEMA_VERSION: u32 = 1;

/// Ownership fields attached to every planned change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipInfo {
    pub ownership: OwnershipLabel,
    pub ownership_state: OwnershipState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_baseline_source: Option<BaselineSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ownership_reason_codes: Vec<String>,
}

impl From<OwnershipAssessment> for OwnershipInfo {
    fn from(assessment: OwnershipAssessment) -> Self {
        OwnershipInfo {
            ownership: assessment.label,
            ownership_state: assessment.state,
            ownership_confidence: assessment.confidence,
            ownership_baseline_source: assessment.baseline_source,
            ownership_reason_codes: assessment.reason_codes,
        }
    }
}

impl OwnershipInfo {
    /// Ownership attached to a pure template addition: upstream is adding a
    /// file the repo does not have, so there is nothing local to weigh.
    pub fn addition() -> Self {
        OwnershipInfo {
            ownership: OwnershipLabel::UpstreamTemplateDelta,
            ownership_state: OwnershipState::UpstreamTemplateDelta,
            ownership_confidence: None,
            ownership_baseline_source: None,
            ownership_reason_codes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChange {
    pub path: String,
    #[serde(flatten)]
    pub ownership: OwnershipInfo,
}

/// How a rename was detected. Currently only exact-hash matching exists.
pub const RENAME_DETECTION_UNIQUE_HASH: &str = "unique_exact_normalized_hash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRename {
    pub from: String,
    pub to: String,
    pub confidence: Confidence,
    pub detection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinAction {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "remove")]
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinVersionChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub action: PinAction,
}

/// Pending config-key migration surfaced in a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKeyMigration {
    pub op_id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub schema_version: u32,
    pub dry_run: bool,
    pub template_additions: Vec<PlanChange>,
    pub template_updates: Vec<PlanChange>,
    pub section_aware_updates: Vec<PlanChange>,
    pub template_renames: Vec<PlanRename>,
    pub template_removals_or_orphans: Vec<PlanChange>,
    pub config_key_migrations: Vec<ConfigKeyMigration>,
    pub pin_version_change: PinVersionChange,
    pub readiness_checks: Vec<ReadinessFinding>,
}

impl UpgradePlan {
    /// Whether the plan contains any template work at all.
    pub fn has_template_changes(&self) -> bool {
        !self.template_additions.is_empty()
            || !self.template_updates.is_empty()
            || !self.section_aware_updates.is_empty()
            || !self.template_renames.is_empty()
            || !self.template_removals_or_orphans.is_empty()
    }
}

/// Per-change content preview, computed on demand from a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPreview {
    pub path: String,
    pub ownership: OwnershipLabel,
    /// Normalized current content; empty for additions.
    pub before: String,
    /// Normalized target content; empty for removals.
    pub after: String,
    pub added_lines: Vec<String>,
    pub removed_lines: Vec<String>,
}
