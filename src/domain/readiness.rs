//! Readiness findings: non-fatal diagnostics reported by the readiness
//! checker and embedded in dry-run plans.

use serde::{Deserialize, Serialize};

/// Closed set of readiness finding ids.
pub mod finding {
    pub const UNRECOGNIZED_CONFIG_KEYS: &str = "unrecognized_config_keys";
    pub const UNRESOLVED_CONFIG_PLACEHOLDERS: &str = "unresolved_config_placeholders";
    pub const PROCESS_ENV_OVERRIDES_DOTENV: &str = "process_env_overrides_dotenv";
    pub const IGNORED_EMPTY_DOTENV_ASSIGNMENTS: &str = "ignored_empty_dotenv_assignments";
    pub const PATH_EXPANSION_ANOMALIES: &str = "path_expansion_anomalies";
    pub const VSCODE_NO_SYNC_OUTPUTS_STALE: &str = "vscode_no_sync_outputs_stale";
    pub const FLOATING_EXTERNAL_DEPENDENCY_SPECS: &str = "floating_external_dependency_specs";
    pub const STALE_DISABLED_AGENT_ARTIFACTS: &str = "stale_disabled_agent_artifacts";
    pub const GENERATED_SECRET_RISK: &str = "generated_secret_risk";
    pub const MISSING_REQUIRED_CONFIG_FIELDS: &str = "missing_required_config_fields";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFinding {
    pub id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ReadinessFinding {
    pub fn new(id: &str, summary: impl Into<String>, mut details: Vec<String>) -> Self {
        details.sort();
        details.dedup();
        ReadinessFinding { id: id.to_string(), summary: summary.into(), details }
    }
}

/// Sort findings by id so reports are deterministic.
pub fn sort_findings(findings: &mut Vec<ReadinessFinding>) {
    findings.sort_by(|a, b| a.id.cmp(&b.id));
}
