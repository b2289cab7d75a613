//! Path registry for the managed `.agent-layer/` layout.
//!
//! Every managed entity identifies itself by a forward-slash relative path
//! anchored at the repository root. The registry is a constant table; adding
//! a managed path means adding it here and to the embedded manifests.

use std::path::{Path, PathBuf};

use super::policy::PolicyId;

pub const AGENT_LAYER_DIR: &str = ".agent-layer";
pub const PIN_FILE: &str = ".agent-layer/al.version";
pub const ENV_FILE: &str = ".agent-layer/.env";
pub const CONFIG_FILE: &str = ".agent-layer/config.toml";
pub const STATE_DIR: &str = ".agent-layer/state";
pub const BASELINE_STATE_FILE: &str = ".agent-layer/state/managed-baseline.json";
pub const SNAPSHOT_DIR: &str = ".agent-layer/state/upgrade-snapshots";
pub const LEGACY_DOCS_SNAPSHOT_DIR: &str = ".agent-layer/templates/docs";
pub const GITIGNORE_FILE: &str = ".gitignore";
pub const VSCODE_DIR: &str = ".vscode";

/// Directories whose entire contents are engine-managed. Any file found under
/// one of these that is not a known template is an orphan or an unknown.
pub const MANAGED_ROOTS: [&str; 3] =
    [".agent-layer/instructions", ".agent-layer/slash-commands", "docs/agent-layer"];

/// Managed paths with a non-default ownership policy, plus standalone managed
/// files that live outside the managed roots.
const POLICY_TABLE: [(&str, PolicyId); 4] = [
    ("docs/agent-layer/ISSUES.md", PolicyId::MemoryEntriesV1),
    ("docs/agent-layer/ROADMAP.md", PolicyId::MemoryRoadmapV1),
    (".agent-layer/commands.allow", PolicyId::AllowlistLinesV1),
    (".agent-layer/config.toml", PolicyId::FullFile),
];

/// The ownership policy for a relative path. Paths without a table entry use
/// `full_file`.
pub fn policy_for(rel_path: &str) -> PolicyId {
    let cleaned = clean_rel_path(rel_path);
    POLICY_TABLE
        .iter()
        .find(|(path, _)| *path == cleaned)
        .map(|(_, policy)| *policy)
        .unwrap_or(PolicyId::FullFile)
}

/// Whether the engine owns this path: either the registry lists it or it sits
/// inside a managed root directory.
pub fn is_managed(rel_path: &str) -> bool {
    let cleaned = clean_rel_path(rel_path);
    if POLICY_TABLE.iter().any(|(path, _)| *path == cleaned) {
        return true;
    }
    MANAGED_ROOTS.iter().any(|root| is_under(&cleaned, root))
}

/// Whether `rel_path` is `root` itself or a descendant of it.
pub fn is_under(rel_path: &str, root: &str) -> bool {
    rel_path == root || rel_path.starts_with(&format!("{root}/"))
}

/// Clean a relative path: forward slashes only, no empty or `.` components,
/// `..` resolved logically. The result never escapes the repo root; leading
/// `..` components are dropped.
pub fn clean_rel_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let normalized = path.replace('\\', "/");
    for component in normalized.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            normal => parts.push(normal),
        }
    }
    parts.join("/")
}

/// Join a cleaned relative path onto an absolute repository root.
pub fn abs_path(root: &Path, rel_path: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in clean_rel_path(rel_path).split('/') {
        if !component.is_empty() {
            path.push(component);
        }
    }
    path
}

/// Depth of a relative path (number of components). Rollback orders removals
/// deepest-first and re-creations shallowest-first with this.
pub fn depth(rel_path: &str) -> usize {
    clean_rel_path(rel_path).split('/').filter(|part| !part.is_empty()).count()
}
