//! Migration executor: interprets versioned migration manifests with
//! content-preserving conflict rules.

use std::path::Path;

use crate::adapters::embedded_migrations;
use crate::domain::AppError;
use crate::domain::config;
use crate::domain::migration::{MigrationAction, MigrationManifest, MigrationOp, parse_key_path};
use crate::domain::paths::{CONFIG_FILE, abs_path};
use crate::domain::version::VersionTriplet;
use crate::ports::System;

/// Result of one executed operation, for report aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub op_id: String,
    pub changed: bool,
    pub skip_reason: Option<String>,
}

impl OpOutcome {
    fn changed(op: &MigrationOp) -> Self {
        OpOutcome { op_id: op.id.clone(), changed: true, skip_reason: None }
    }

    fn skipped(op: &MigrationOp, reason: impl Into<String>) -> Self {
        OpOutcome { op_id: op.id.clone(), changed: false, skip_reason: Some(reason.into()) }
    }
}

/// Load every embedded migration manifest, validated, sorted by target
/// version.
pub fn load_all_migrations() -> Result<Vec<MigrationManifest>, AppError> {
    let mut manifests = Vec::new();
    for (stem, bytes) in embedded_migrations() {
        let manifest: MigrationManifest = serde_json::from_slice(bytes).map_err(|err| {
            AppError::schema(
                "migration manifest",
                format!("migrations/{stem}.json"),
                err.to_string(),
            )
        })?;
        manifest.validate().map_err(|reason| {
            AppError::schema("migration manifest", format!("migrations/{stem}.json"), reason)
        })?;
        if manifest.target_version != stem {
            return Err(AppError::schema(
                "migration manifest",
                format!("migrations/{stem}.json"),
                format!(
                    "embedded target_version '{}' does not match file stem",
                    manifest.target_version
                ),
            ));
        }
        manifests.push(manifest);
    }
    manifests.sort_by_key(|manifest| VersionTriplet::parse(&manifest.target_version));
    Ok(manifests)
}

/// Select the migrations to run when moving from `current` to `target`.
///
/// A manifest applies when `current < manifest.target_version <= target`.
/// A `current` below a manifest's `min_prior_version` is an unsupported
/// upgrade path; with no current pin there is nothing to migrate.
pub fn applicable_migrations(
    current: Option<VersionTriplet>,
    target: VersionTriplet,
) -> Result<Vec<MigrationManifest>, AppError> {
    let Some(current) = current else {
        return Ok(Vec::new());
    };

    let mut selected = Vec::new();
    for manifest in load_all_migrations()? {
        let manifest_target = VersionTriplet::parse(&manifest.target_version)
            .expect("validated manifests carry parseable versions");
        if manifest_target <= current || manifest_target > target {
            continue;
        }
        let min_prior = VersionTriplet::parse(&manifest.min_prior_version)
            .expect("validated manifests carry parseable versions");
        if current < min_prior {
            return Err(AppError::validation(format!(
                "cannot migrate from {current} to {manifest_target}: requires at least {min_prior}"
            )));
        }
        selected.push(manifest);
    }
    Ok(selected)
}

/// Execute every operation of a manifest in order, surfacing the first error.
pub fn execute(
    sys: &dyn System,
    root: &Path,
    manifest: &MigrationManifest,
) -> Result<Vec<OpOutcome>, AppError> {
    let mut outcomes = Vec::new();
    for op in &manifest.operations {
        outcomes.push(execute_op(sys, root, op)?);
    }
    Ok(outcomes)
}

fn execute_op(sys: &dyn System, root: &Path, op: &MigrationOp) -> Result<OpOutcome, AppError> {
    match &op.action {
        MigrationAction::RenameFile { from, to }
        | MigrationAction::RenameGeneratedArtifact { from, to } => {
            rename_file(sys, root, op, from, to)
        }
        MigrationAction::DeleteFile { path }
        | MigrationAction::DeleteGeneratedArtifact { path } => delete_file(sys, root, op, path),
        MigrationAction::ConfigRenameKey { from_key, to_key } => {
            config_rename_key(sys, root, op, from_key, to_key)
        }
        MigrationAction::ConfigSetDefault { key, value } => {
            config_set_default(sys, root, op, key, value)
        }
    }
}

fn rename_file(
    sys: &dyn System,
    root: &Path,
    op: &MigrationOp,
    from: &str,
    to: &str,
) -> Result<OpOutcome, AppError> {
    if from == to {
        return Ok(OpOutcome::skipped(op, "source and target are the same path"));
    }

    let from_abs = abs_path(root, from);
    let to_abs = abs_path(root, to);

    if sys.stat(&from_abs)?.is_none() {
        // Target stat errors other than not-exist still surface here.
        sys.stat(&to_abs)?;
        return Ok(OpOutcome::skipped(op, "source does not exist"));
    }

    match sys.stat(&to_abs)? {
        None => {
            sys.rename(&from_abs, &to_abs)?;
            Ok(OpOutcome::changed(op))
        }
        Some(_) => {
            let from_bytes = sys.read_file(&from_abs)?;
            let to_bytes = sys.read_file(&to_abs)?;
            if from_bytes == to_bytes {
                sys.remove_all(&from_abs)?;
                Ok(OpOutcome::changed(op))
            } else {
                Err(AppError::MigrationConflict {
                    op_id: op.id.clone(),
                    reason: format!("target already exists: '{to}' differs from '{from}'"),
                })
            }
        }
    }
}

fn delete_file(
    sys: &dyn System,
    root: &Path,
    op: &MigrationOp,
    path: &str,
) -> Result<OpOutcome, AppError> {
    let abs = abs_path(root, path);
    if sys.stat(&abs)?.is_none() {
        return Ok(OpOutcome::skipped(op, "path does not exist"));
    }
    sys.remove_all(&abs)?;
    Ok(OpOutcome::changed(op))
}

fn read_config(sys: &dyn System, root: &Path) -> Result<Option<toml::Value>, AppError> {
    let abs = abs_path(root, CONFIG_FILE);
    if sys.stat(&abs)?.is_none() {
        return Ok(None);
    }
    let bytes = sys.read_file(&abs)?;
    config::parse_loose(&bytes)
        .map(Some)
        .map_err(|reason| AppError::schema("config", CONFIG_FILE, reason))
}

fn write_config(sys: &dyn System, root: &Path, value: &toml::Value) -> Result<(), AppError> {
    let rendered = config::serialize_config(value)
        .map_err(|reason| AppError::schema("config", CONFIG_FILE, reason))?;
    sys.write_file_atomic(&abs_path(root, CONFIG_FILE), rendered.as_bytes(), 0o644)
}

fn config_rename_key(
    sys: &dyn System,
    root: &Path,
    op: &MigrationOp,
    from_key: &str,
    to_key: &str,
) -> Result<OpOutcome, AppError> {
    let Some(mut value) = read_config(sys, root)? else {
        return Ok(OpOutcome::skipped(op, "config does not exist"));
    };

    let from_path = parse_key_path(from_key)
        .map_err(|reason| AppError::MigrationConflict { op_id: op.id.clone(), reason })?;
    let to_path = parse_key_path(to_key)
        .map_err(|reason| AppError::MigrationConflict { op_id: op.id.clone(), reason })?;

    let conflict = |reason: String| AppError::MigrationConflict { op_id: op.id.clone(), reason };

    let from_value = match config::get_key(&value, &from_path).map_err(&conflict)? {
        Some(found) => found.clone(),
        None => return Ok(OpOutcome::skipped(op, "source key does not exist")),
    };
    let existing = config::get_key(&value, &to_path).map_err(&conflict)?.cloned();

    match existing {
        Some(existing) if existing == from_value => {
            config::remove_key(&mut value, &from_path).map_err(&conflict)?;
        }
        Some(_) => {
            return Err(conflict(format!(
                "conflict: '{to_key}' already exists with a different value"
            )));
        }
        None => {
            config::remove_key(&mut value, &from_path).map_err(&conflict)?;
            config::set_key(&mut value, &to_path, from_value).map_err(&conflict)?;
        }
    }

    write_config(sys, root, &value)?;
    Ok(OpOutcome::changed(op))
}

fn config_set_default(
    sys: &dyn System,
    root: &Path,
    op: &MigrationOp,
    key: &str,
    default: &serde_json::Value,
) -> Result<OpOutcome, AppError> {
    let Some(mut value) = read_config(sys, root)? else {
        return Ok(OpOutcome::skipped(op, "config does not exist"));
    };

    let conflict = |reason: String| AppError::MigrationConflict { op_id: op.id.clone(), reason };
    let key_path = parse_key_path(key).map_err(&conflict)?;

    if config::get_key(&value, &key_path).map_err(&conflict)?.is_some() {
        return Ok(OpOutcome::skipped(op, "key already set"));
    }

    let toml_value = config::json_to_toml(default).map_err(&conflict)?;
    config::set_key(&mut value, &key_path, toml_value).map_err(&conflict)?;
    write_config(sys, root, &value)?;
    Ok(OpOutcome::changed(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemSystem;

    fn root() -> &'static Path {
        Path::new("/repo")
    }

    fn op(id: &str, action: MigrationAction) -> MigrationOp {
        MigrationOp { id: id.to_string(), action }
    }

    #[test]
    fn rename_moves_file_when_target_absent() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/old.md", b"source\n");
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "mv",
                MigrationAction::RenameFile {
                    from: ".agent-layer/old.md".to_string(),
                    to: ".agent-layer/sub/new.md".to_string(),
                },
            ),
        )
        .unwrap();
        assert!(outcome.changed);
        assert!(!sys.exists("/repo/.agent-layer/old.md"));
        assert_eq!(sys.file_content("/repo/.agent-layer/sub/new.md").unwrap(), b"source\n");
    }

    #[test]
    fn rename_with_identical_target_removes_source() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/old.md", b"same\n");
        sys.add_file("/repo/.agent-layer/new.md", b"same\n");
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "mv",
                MigrationAction::RenameFile {
                    from: ".agent-layer/old.md".to_string(),
                    to: ".agent-layer/new.md".to_string(),
                },
            ),
        )
        .unwrap();
        assert!(outcome.changed);
        assert!(!sys.exists("/repo/.agent-layer/old.md"));
    }

    #[test]
    fn rename_conflict_modifies_nothing() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/old.md", b"source\n");
        sys.add_file("/repo/.agent-layer/new.md", b"target\n");
        let err = execute_op(
            &sys,
            root(),
            &op(
                "mv",
                MigrationAction::RenameFile {
                    from: ".agent-layer/old.md".to_string(),
                    to: ".agent-layer/new.md".to_string(),
                },
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("target already exists"));
        assert_eq!(sys.file_content("/repo/.agent-layer/old.md").unwrap(), b"source\n");
        assert_eq!(sys.file_content("/repo/.agent-layer/new.md").unwrap(), b"target\n");
    }

    #[test]
    fn rename_is_noop_when_both_absent_or_same_path() {
        let sys = MemSystem::new();
        let absent = execute_op(
            &sys,
            root(),
            &op(
                "mv",
                MigrationAction::RenameFile {
                    from: ".agent-layer/a.md".to_string(),
                    to: ".agent-layer/b.md".to_string(),
                },
            ),
        )
        .unwrap();
        assert!(!absent.changed);

        let same = execute_op(
            &sys,
            root(),
            &op(
                "mv2",
                MigrationAction::RenameFile {
                    from: ".agent-layer/a.md".to_string(),
                    to: ".agent-layer/a.md".to_string(),
                },
            ),
        )
        .unwrap();
        assert_eq!(same.skip_reason.as_deref(), Some("source and target are the same path"));
    }

    #[test]
    fn delete_is_noop_when_absent() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/gone.md", b"x");
        let deleted = execute_op(
            &sys,
            root(),
            &op("rm", MigrationAction::DeleteFile { path: ".agent-layer/gone.md".to_string() }),
        )
        .unwrap();
        assert!(deleted.changed);

        let again = execute_op(
            &sys,
            root(),
            &op("rm2", MigrationAction::DeleteFile { path: ".agent-layer/gone.md".to_string() }),
        )
        .unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn config_rename_key_moves_value() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n\n[tools]\nallow = [\"x\"]\n");
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "rk",
                MigrationAction::ConfigRenameKey {
                    from_key: "tools.allow".to_string(),
                    to_key: "tools.allow_extra".to_string(),
                },
            ),
        )
        .unwrap();
        assert!(outcome.changed);

        let rendered =
            String::from_utf8(sys.file_content("/repo/.agent-layer/config.toml").unwrap())
                .unwrap();
        assert!(rendered.contains("allow_extra"));
        assert!(!rendered.contains("allow = "));
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn config_rename_key_conflict_on_differing_target() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            b"[tools]\nallow = [\"x\"]\nallow_extra = [\"y\"]\n",
        );
        let err = execute_op(
            &sys,
            root(),
            &op(
                "rk",
                MigrationAction::ConfigRenameKey {
                    from_key: "tools.allow".to_string(),
                    to_key: "tools.allow_extra".to_string(),
                },
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn config_rename_key_drops_source_when_target_equal() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            b"[tools]\nallow = [\"x\"]\nallow_extra = [\"x\"]\n",
        );
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "rk",
                MigrationAction::ConfigRenameKey {
                    from_key: "tools.allow".to_string(),
                    to_key: "tools.allow_extra".to_string(),
                },
            ),
        )
        .unwrap();
        assert!(outcome.changed);
        let rendered =
            String::from_utf8(sys.file_content("/repo/.agent-layer/config.toml").unwrap())
                .unwrap();
        assert!(!rendered.contains("allow = "));
    }

    #[test]
    fn config_rename_through_non_table_errors() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n");
        let err = execute_op(
            &sys,
            root(),
            &op(
                "rk",
                MigrationAction::ConfigRenameKey {
                    from_key: "schema_version.inner".to_string(),
                    to_key: "tools.allow".to_string(),
                },
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a table"));
    }

    #[test]
    fn config_set_default_respects_existing_value() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 2\n");
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "sd",
                MigrationAction::ConfigSetDefault {
                    key: "schema_version".to_string(),
                    value: serde_json::json!(1),
                },
            ),
        )
        .unwrap();
        assert_eq!(outcome.skip_reason.as_deref(), Some("key already set"));
        let rendered =
            String::from_utf8(sys.file_content("/repo/.agent-layer/config.toml").unwrap())
                .unwrap();
        assert!(rendered.contains("schema_version = 2"));
    }

    #[test]
    fn config_set_default_creates_intermediate_tables() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n");
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "sd",
                MigrationAction::ConfigSetDefault {
                    key: "agents.vscode.enabled".to_string(),
                    value: serde_json::json!(true),
                },
            ),
        )
        .unwrap();
        assert!(outcome.changed);
        let rendered =
            String::from_utf8(sys.file_content("/repo/.agent-layer/config.toml").unwrap())
                .unwrap();
        assert!(rendered.contains("[agents.vscode]"));
        assert!(rendered.contains("enabled = true"));
    }

    #[test]
    fn config_ops_are_noops_without_config() {
        let sys = MemSystem::new();
        let outcome = execute_op(
            &sys,
            root(),
            &op(
                "sd",
                MigrationAction::ConfigSetDefault {
                    key: "schema_version".to_string(),
                    value: serde_json::json!(1),
                },
            ),
        )
        .unwrap();
        assert_eq!(outcome.skip_reason.as_deref(), Some("config does not exist"));
    }

    #[test]
    fn applicable_migrations_windows_on_current_and_target() {
        let none = applicable_migrations(None, VersionTriplet::parse("0.4.0").unwrap()).unwrap();
        assert!(none.is_empty());

        let from_030 = applicable_migrations(
            VersionTriplet::parse("0.3.0"),
            VersionTriplet::parse("0.4.0").unwrap(),
        )
        .unwrap();
        assert!(from_030.iter().any(|manifest| manifest.target_version == "0.4.0"));

        let already_there = applicable_migrations(
            VersionTriplet::parse("0.4.0"),
            VersionTriplet::parse("0.4.0").unwrap(),
        )
        .unwrap();
        assert!(already_there.is_empty());
    }
}
