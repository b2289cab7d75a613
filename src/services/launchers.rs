//! `.gitignore` guard block and VS Code launcher outputs.

use std::path::Path;

use serde_json::json;

use crate::domain::AppError;
use crate::domain::config::StrictConfig;
use crate::domain::paths::{GITIGNORE_FILE, VSCODE_DIR, abs_path};
use crate::ports::System;

pub const GITIGNORE_BLOCK_BEGIN: &str = "# agent-layer (managed)";
pub const GITIGNORE_BLOCK_END: &str = "# end agent-layer";

const GITIGNORE_ENTRIES: [&str; 2] = [".agent-layer/state/", ".agent-layer/.env"];

fn managed_block() -> String {
    let mut block = String::new();
    block.push_str(GITIGNORE_BLOCK_BEGIN);
    block.push('\n');
    for entry in GITIGNORE_ENTRIES {
        block.push_str(entry);
        block.push('\n');
    }
    block.push_str(GITIGNORE_BLOCK_END);
    block.push('\n');
    block
}

/// Ensure the managed `.gitignore` block exists, rewriting it idempotently.
/// User content outside the block is preserved byte-for-byte.
pub fn update_gitignore(sys: &dyn System, root: &Path) -> Result<bool, AppError> {
    let path = abs_path(root, GITIGNORE_FILE);
    let existing = match sys.stat(&path)? {
        Some(_) => String::from_utf8_lossy(&sys.read_file(&path)?).to_string(),
        None => String::new(),
    };

    let updated = splice_block(&existing);
    if updated == existing {
        return Ok(false);
    }
    sys.write_file_atomic(&path, updated.as_bytes(), 0o644)?;
    Ok(true)
}

fn splice_block(existing: &str) -> String {
    let block = managed_block();
    let lines: Vec<&str> = existing.lines().collect();
    let begin = lines.iter().position(|line| line.trim() == GITIGNORE_BLOCK_BEGIN);
    let end = lines.iter().position(|line| line.trim() == GITIGNORE_BLOCK_END);

    match (begin, end) {
        (Some(begin), Some(end)) if begin <= end => {
            let mut out = String::new();
            for line in &lines[..begin] {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&block);
            for line in &lines[end + 1..] {
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        _ => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&block);
            out
        }
    }
}

/// Whether the managed block currently covers `.agent-layer/.env`.
pub fn gitignore_covers_env(sys: &dyn System, root: &Path) -> Result<bool, AppError> {
    let path = abs_path(root, GITIGNORE_FILE);
    if sys.stat(&path)?.is_none() {
        return Ok(false);
    }
    let content = String::from_utf8_lossy(&sys.read_file(&path)?).to_string();
    Ok(content.lines().any(|line| line.trim() == ".agent-layer/.env"))
}

/// Launcher path for one agent.
pub fn launcher_rel_path(agent: &str) -> String {
    format!("{VSCODE_DIR}/agent-layer.{agent}.json")
}

/// Launcher paths for every agent named in the config, enabled or not.
/// The snapshot covers all of them so a run can be rolled back cleanly.
pub fn launcher_rel_paths(config: &StrictConfig) -> Vec<String> {
    config.agents.keys().map(|agent| launcher_rel_path(agent)).collect()
}

/// Write launcher files for enabled agents with `output = "tasks"`.
/// Returns the rel paths written.
pub fn write_launchers(
    sys: &dyn System,
    root: &Path,
    config: &StrictConfig,
) -> Result<Vec<String>, AppError> {
    let mut written = Vec::new();
    for (agent, settings) in &config.agents {
        if !settings.enabled || settings.output.as_deref() != Some("tasks") {
            continue;
        }
        let rel = launcher_rel_path(agent);
        let body = json!({
            "version": "2.0.0",
            "tasks": [
                {
                    "label": format!("agent-layer: {agent} instructions"),
                    "type": "shell",
                    "command": "cat",
                    "args": [".agent-layer/instructions/core.md"],
                    "problemMatcher": []
                }
            ]
        });
        let mut rendered = serde_json::to_string_pretty(&body)
            .map_err(|err| AppError::validation(format!("failed to render launcher: {err}")))?;
        rendered.push('\n');
        sys.write_file_atomic(&abs_path(root, &rel), rendered.as_bytes(), 0o644)?;
        written.push(rel);
    }
    written.sort();
    Ok(written)
}
