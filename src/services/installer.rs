//! Installer controller: the single mutator. Drives a fixed phase order with
//! snapshot coverage of every path the run may touch, and rolls back on any
//! failure.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::domain::AppError;
use crate::domain::baseline::BaselineState;
use crate::domain::comparable::{build_ownership_comparable, extract_managed_section, normalize};
use crate::domain::config::{self, StrictConfig};
use crate::domain::migration::MigrationAction;
use crate::domain::ownership::{BaselineSource, OwnershipLabel, classify};
use crate::domain::paths::{
    AGENT_LAYER_DIR, BASELINE_STATE_FILE, CONFIG_FILE, GITIGNORE_FILE, MANAGED_ROOTS, PIN_FILE,
    abs_path, policy_for,
};
use crate::domain::plan::DiffPreview;
use crate::domain::snapshot::SnapshotStatus;
use crate::domain::version::VersionTriplet;
use crate::ports::{Prompter, System, TemplateSource};
use crate::services::migrations::OpOutcome;
use crate::services::planner::{
    self, PlanOptions, TemplateEntry, enumerate_templates, resolve_target_version, validate_root,
};
use crate::services::{launchers, manifest_store, migrations, snapshot, unknowns};

/// Which entry point invoked the run. Selects the baseline `source` and the
/// existing-workspace check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Init,
    Upgrade,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Overwrite mode: locally customized files may be replaced after
    /// prompting, and unknown paths are offered for deletion.
    pub overwrite: bool,
    pub target_pin_version: Option<String>,
}

impl RunOptions {
    pub fn init() -> Self {
        RunOptions { mode: RunMode::Init, overwrite: false, target_pin_version: None }
    }

    pub fn upgrade() -> Self {
        RunOptions { mode: RunMode::Upgrade, overwrite: false, target_pin_version: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub target_version: String,
    pub snapshot_id: String,
    /// Templates written or rewritten, sorted.
    pub written_templates: Vec<String>,
    /// Locally customized files preserved instead of overwritten, sorted.
    pub preserved_local: Vec<String>,
    pub deleted_unknowns: Vec<String>,
    pub migration_outcomes: Vec<OpOutcome>,
    pub launchers_written: Vec<String>,
    pub baseline_written: bool,
    pub warnings: Vec<String>,
}

fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn read_strict_config(sys: &dyn System, root: &Path) -> Result<StrictConfig, AppError> {
    let abs = abs_path(root, CONFIG_FILE);
    if sys.stat(&abs)?.is_none() {
        return Ok(StrictConfig::default());
    }
    let bytes = sys.read_file(&abs)?;
    let loose = config::parse_loose(&bytes)
        .map_err(|reason| AppError::schema("config", CONFIG_FILE, reason))?;
    Ok(config::recognized_subset(&loose))
}

/// Run the installer against a repo root. See the phase list in the module
/// docs; any error after snapshot capture triggers an automatic rollback.
pub fn run(
    sys: &dyn System,
    templates: &dyn TemplateSource,
    root: &Path,
    prompter: Option<&dyn Prompter>,
    options: &RunOptions,
) -> Result<RunReport, AppError> {
    // Phase 1: validation, before any side effect.
    validate_root(root)?;
    let plan_options = PlanOptions { target_pin_version: options.target_pin_version.clone() };
    let target_version = resolve_target_version(&plan_options)?;

    if options.overwrite {
        let prompter = prompter.ok_or(AppError::PrompterRequired(
            "overwrite_all and overwrite_all_memory",
        ))?;
        let capabilities = prompter.capabilities();
        if !capabilities.overwrite || !capabilities.overwrite_memory {
            return Err(AppError::PrompterRequired("overwrite_all and overwrite_all_memory"));
        }
    }
    if options.mode == RunMode::Init
        && !options.overwrite
        && sys.stat(&abs_path(root, AGENT_LAYER_DIR))?.is_some()
    {
        return Err(AppError::validation(format!(
            "'{AGENT_LAYER_DIR}' already exists; run upgrade, or init with overwrite"
        )));
    }

    let entries = enumerate_templates(templates)?;
    let template_set: BTreeSet<String> = entries.iter().map(|entry| entry.rel.clone()).collect();

    let pin = manifest_store::read_pin(sys, root)?;
    let mut warnings = pin.warnings.clone();
    let current_triplet = pin.version.as_deref().and_then(VersionTriplet::parse);
    let target_triplet = VersionTriplet::parse(&target_version)
        .ok_or_else(|| AppError::validation(format!("invalid target version '{target_version}'")))?;
    let pending_migrations = migrations::applicable_migrations(current_triplet, target_triplet)?;

    // Phase 2: scan unknowns before capture so they are rollback-protected.
    let unknown_paths = unknowns::scan_unknowns(sys, root, &template_set)?;

    // Phase 3: compute targets, capture, persist, prune.
    let mut targets: BTreeSet<String> = BTreeSet::new();
    targets.insert(PIN_FILE.to_string());
    targets.insert(GITIGNORE_FILE.to_string());
    targets.insert(BASELINE_STATE_FILE.to_string());
    targets.extend(template_set.iter().cloned());
    targets.extend(MANAGED_ROOTS.iter().map(|managed| managed.to_string()));
    targets.extend(unknown_paths.iter().cloned());
    for manifest in &pending_migrations {
        for op in &manifest.operations {
            match &op.action {
                MigrationAction::RenameFile { from, to }
                | MigrationAction::RenameGeneratedArtifact { from, to } => {
                    targets.insert(from.clone());
                    targets.insert(to.clone());
                }
                MigrationAction::DeleteFile { path }
                | MigrationAction::DeleteGeneratedArtifact { path } => {
                    targets.insert(path.clone());
                }
                MigrationAction::ConfigRenameKey { .. }
                | MigrationAction::ConfigSetDefault { .. } => {
                    targets.insert(CONFIG_FILE.to_string());
                }
            }
        }
    }
    let pre_config = read_strict_config(sys, root)?;
    targets.extend(launchers::launcher_rel_paths(&pre_config));

    let now = Utc::now();
    let snapshot_id = snapshot::new_snapshot_id(now);
    let created_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut snap = snapshot::capture(sys, root, &targets, &snapshot_id, &created_at)?;
    if let Some(size_warning) = snapshot::write(sys, root, &snap)? {
        warnings.push(size_warning);
    }
    snapshot::prune(sys, root)?;

    // Phases 4-9 run under rollback protection.
    let outcome = apply_phases(
        sys,
        templates,
        root,
        prompter,
        options,
        &entries,
        &unknown_paths,
        &pending_migrations,
        &target_version,
    );

    match outcome {
        Ok(mut report) => {
            snapshot::update_status(sys, root, &mut snap, SnapshotStatus::Applied, None, None)?;
            report.target_version = target_version;
            report.snapshot_id = snapshot_id;
            warnings.extend(report.warnings.drain(..));
            report.warnings = warnings;
            Ok(report)
        }
        Err((step, error)) => match snapshot::rollback(sys, root, &snap) {
            Ok(()) => {
                snapshot::update_status(
                    sys,
                    root,
                    &mut snap,
                    SnapshotStatus::AutoRolledBack,
                    Some(step),
                    Some(error.to_string()),
                )?;
                Err(error)
            }
            Err(rollback_error) => {
                let _ = snapshot::update_status(
                    sys,
                    root,
                    &mut snap,
                    SnapshotStatus::RollbackFailed,
                    Some(step.clone()),
                    Some(error.to_string()),
                );
                Err(AppError::RollbackFailed {
                    step,
                    error: error.to_string(),
                    rollback_error: rollback_error.to_string(),
                })
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_phases(
    sys: &dyn System,
    templates: &dyn TemplateSource,
    root: &Path,
    prompter: Option<&dyn Prompter>,
    options: &RunOptions,
    entries: &[TemplateEntry],
    unknown_paths: &[String],
    pending_migrations: &[crate::domain::migration::MigrationManifest],
    target_version: &str,
) -> Result<RunReport, (String, AppError)> {
    let mut report = RunReport::default();

    // Phase 4: migrations.
    for manifest in pending_migrations {
        let outcomes = migrations::execute(sys, root, manifest)
            .map_err(|err| ("migrations".to_string(), err))?;
        report.migration_outcomes.extend(outcomes);
    }

    // Phase 5: template writes.
    write_templates(sys, root, prompter, options, entries, &mut report)
        .map_err(|err| ("write_templates".to_string(), err))?;

    // Phase 6: .gitignore and launchers.
    (|| -> Result<(), AppError> {
        launchers::update_gitignore(sys, root)?;
        let post_config = read_strict_config(sys, root)?;
        report.launchers_written = launchers::write_launchers(sys, root, &post_config)?;
        Ok(())
    })()
    .map_err(|err| ("launchers".to_string(), err))?;

    // Phase 7: unknown paths (overwrite mode only).
    if options.overwrite {
        report.deleted_unknowns = unknowns::handle_unknowns(sys, root, unknown_paths, prompter)
            .map_err(|err| ("unknowns".to_string(), err))?;
    }

    // Phase 8: pin file.
    sys.write_file_atomic(
        &abs_path(root, PIN_FILE),
        format!("{target_version}\n").as_bytes(),
        0o644,
    )
    .map_err(|err| ("write_pin".to_string(), err))?;

    // Phase 9: baseline, only when the diff set is now empty.
    (|| -> Result<(), AppError> {
        if !diffs_empty(sys, root, entries)? {
            return Ok(());
        }
        let manifest = manifest_store::load_manifest(target_version)?;
        let source = if options.overwrite {
            BaselineSource::WrittenByOverwrite
        } else if options.mode == RunMode::Init {
            BaselineSource::WrittenByInit
        } else {
            BaselineSource::WrittenByUpgrade
        };
        let now = now_utc_string();
        let state = BaselineState {
            schema_version: manifest.schema_version,
            version: manifest.version.clone(),
            generated_at_utc: manifest.generated_at_utc.clone(),
            files: manifest.files.clone(),
            metadata: manifest.metadata.clone(),
            source,
            created_at_utc: now.clone(),
            updated_at_utc: now.clone(),
        };
        manifest_store::write_baseline_state(sys, root, state, &now)?;
        report.baseline_written = true;
        Ok(())
    })()
    .map_err(|err| ("write_baseline".to_string(), err))?;

    report.written_templates.sort();
    report.preserved_local.sort();
    Ok(report)
}

/// Whether every managed and memory file now equals its template under
/// policy.
fn diffs_empty(
    sys: &dyn System,
    root: &Path,
    entries: &[TemplateEntry],
) -> Result<bool, AppError> {
    for entry in entries {
        let abs = abs_path(root, &entry.rel);
        if sys.stat(&abs)?.is_none() {
            return Ok(false);
        }
        let local_bytes = sys.read_file(&abs)?;
        match build_ownership_comparable(policy_for(&entry.rel), &local_bytes) {
            Ok(local) if local.comparable_key() == entry.comparable.comparable_key() => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Compose the on-disk content for a section-aware file: the template's
/// managed section followed by the user's existing entries below the marker.
fn merged_section_content(
    template_bytes: &[u8],
    local_bytes: &[u8],
    marker: &str,
) -> Option<String> {
    let template_normalized = normalize(&String::from_utf8_lossy(template_bytes));
    let managed = extract_managed_section(&template_normalized, marker).ok()?;

    let local_normalized = normalize(&String::from_utf8_lossy(local_bytes));
    let local_lines: Vec<&str> = local_normalized.split('\n').collect();
    let marker_index = local_lines.iter().position(|line| line.trim() == marker)?;

    let mut merged = managed;
    let suffix = local_lines[marker_index + 1..].join("\n");
    merged.push_str(&suffix);
    Some(merged)
}

fn write_templates(
    sys: &dyn System,
    root: &Path,
    prompter: Option<&dyn Prompter>,
    options: &RunOptions,
    entries: &[TemplateEntry],
    report: &mut RunReport,
) -> Result<(), AppError> {
    let mut pending_overwrites: Vec<(&TemplateEntry, DiffPreview)> = Vec::new();
    let mut pending_memory: Vec<(&TemplateEntry, DiffPreview)> = Vec::new();

    for entry in entries {
        let policy = policy_for(&entry.rel);
        let abs = abs_path(root, &entry.rel);

        let Some(_) = sys.stat(&abs)? else {
            sys.write_file_atomic(&abs, &entry.bytes, 0o644)?;
            report.written_templates.push(entry.rel.clone());
            continue;
        };

        let local_bytes = sys.read_file(&abs)?;
        let local_comparable = build_ownership_comparable(policy, &local_bytes).ok();
        if let Some(local) = &local_comparable
            && local.comparable_key() == entry.comparable.comparable_key()
        {
            continue;
        }

        let evidence =
            manifest_store::resolve_baseline(sys, root, &entry.rel, local_comparable.as_ref())?;
        let Some(assessment) = classify(policy, &local_bytes, &evidence, Some(&entry.comparable))
        else {
            continue;
        };

        match assessment.label {
            OwnershipLabel::UpstreamTemplateDelta => {
                write_one_template(sys, &abs, entry, &local_bytes, policy)?;
                report.written_templates.push(entry.rel.clone());
            }
            OwnershipLabel::LocalCustomization | OwnershipLabel::UnknownNoBaseline => {
                if options.overwrite {
                    let preview = planner::preview(
                        &entry.rel,
                        assessment.label,
                        normalize(&String::from_utf8_lossy(&local_bytes)),
                        normalize(&String::from_utf8_lossy(&entry.bytes)),
                    );
                    if policy.is_section_aware() {
                        pending_memory.push((entry, preview));
                    } else {
                        pending_overwrites.push((entry, preview));
                    }
                } else {
                    report.preserved_local.push(entry.rel.clone());
                }
            }
        }
    }

    if !pending_overwrites.is_empty() || !pending_memory.is_empty() {
        let prompter = prompter.ok_or(AppError::PrompterRequired(
            "overwrite_all and overwrite_all_memory",
        ))?;

        if !pending_overwrites.is_empty() {
            let previews: Vec<DiffPreview> =
                pending_overwrites.iter().map(|(_, preview)| preview.clone()).collect();
            if prompter.overwrite_all(&previews)? {
                for (entry, _) in &pending_overwrites {
                    sys.write_file_atomic(&abs_path(root, &entry.rel), &entry.bytes, 0o644)?;
                    report.written_templates.push(entry.rel.clone());
                }
            } else {
                report
                    .preserved_local
                    .extend(pending_overwrites.iter().map(|(entry, _)| entry.rel.clone()));
            }
        }

        if !pending_memory.is_empty() {
            let previews: Vec<DiffPreview> =
                pending_memory.iter().map(|(_, preview)| preview.clone()).collect();
            if prompter.overwrite_all_memory(&previews)? {
                for (entry, _) in &pending_memory {
                    sys.write_file_atomic(&abs_path(root, &entry.rel), &entry.bytes, 0o644)?;
                    report.written_templates.push(entry.rel.clone());
                }
            } else {
                report
                    .preserved_local
                    .extend(pending_memory.iter().map(|(entry, _)| entry.rel.clone()));
            }
        }
    }

    Ok(())
}

/// Overwrite one upstream-delta file. Section-aware files keep the user's
/// entries below the marker; everything else takes the template verbatim.
fn write_one_template(
    sys: &dyn System,
    abs: &Path,
    entry: &TemplateEntry,
    local_bytes: &[u8],
    policy: crate::domain::PolicyId,
) -> Result<(), AppError> {
    let content = policy
        .section_marker()
        .and_then(|marker| merged_section_content(&entry.bytes, local_bytes, marker))
        .map(String::into_bytes)
        .unwrap_or_else(|| entry.bytes.clone());
    sys.write_file_atomic(abs, &content, 0o644)
}

/// Manually restore a snapshot by id and mark it accordingly.
pub fn rollback_snapshot(
    sys: &dyn System,
    root: &Path,
    snapshot_id: &str,
) -> Result<(), AppError> {
    let mut snap = snapshot::read(sys, root, snapshot_id)?;
    snapshot::rollback(sys, root, &snap)?;
    snapshot::update_status(
        sys,
        root,
        &mut snap,
        SnapshotStatus::ManuallyRolledBack,
        None,
        None,
    )
}
