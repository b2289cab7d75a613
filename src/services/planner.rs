//! Upgrade planner: dry-run computation of additions, updates, section-aware
//! updates, renames, orphans, pin changes, and readiness findings.

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::AppError;
use crate::domain::comparable::{
    OwnershipComparable, build_ownership_comparable, hash_normalized, normalize,
};
use crate::domain::migration::MigrationAction;
use crate::domain::ownership::{Confidence, classify};
use crate::domain::paths::{abs_path, policy_for};
use crate::domain::plan::{
    ConfigKeyMigration, DiffPreview, OwnershipInfo, PLAN_SCHEMA_VERSION, PinAction,
    PinVersionChange, PlanChange, PlanRename, RENAME_DETECTION_UNIQUE_HASH, UpgradePlan,
};
use crate::domain::version::normalize_version;
use crate::ports::{System, TemplateSource};
use crate::services::{manifest_store, migrations, readiness, unknowns};

/// Planner/installer options shared by dry runs and mutating runs.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Pin version the run targets. `None` targets the engine's own release.
    pub target_pin_version: Option<String>,
}

/// The release this binary ships templates for.
pub fn engine_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn resolve_target_version(options: &PlanOptions) -> Result<String, AppError> {
    let raw = options.target_pin_version.clone().unwrap_or_else(engine_version);
    normalize_version(&raw)
        .ok_or_else(|| AppError::validation(format!("invalid target pin version '{raw}'")))
}

pub(crate) fn validate_root(root: &Path) -> Result<(), AppError> {
    if root.as_os_str().is_empty() {
        return Err(AppError::validation("repository root must not be empty"));
    }
    Ok(())
}

/// One enumerated template entry with its policy-canonical form.
pub(crate) struct TemplateEntry {
    pub rel: String,
    pub bytes: Vec<u8>,
    pub comparable: OwnershipComparable,
}

pub(crate) fn enumerate_templates(
    templates: &dyn TemplateSource,
) -> Result<Vec<TemplateEntry>, AppError> {
    let mut entries = Vec::new();
    templates.walk("", &mut |rel, bytes| {
        let comparable =
            build_ownership_comparable(policy_for(rel), bytes).map_err(|err| {
                AppError::schema("embedded template", rel, err.reason_code())
            })?;
        entries.push(TemplateEntry { rel: rel.to_string(), bytes: bytes.to_vec(), comparable });
        Ok(())
    })?;
    entries.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(entries)
}

/// Decide the pin action from the current pin and the normalized target.
pub(crate) fn pin_action(pin: &manifest_store::PinRead, target: Option<&str>) -> PinAction {
    match target {
        None => {
            if pin.exists {
                PinAction::Remove
            } else {
                PinAction::None
            }
        }
        Some(target) => {
            if pin.unparseable {
                return PinAction::Update;
            }
            match pin.version.as_deref() {
                None => PinAction::Set,
                Some(current) if current == target => PinAction::None,
                Some(_) => PinAction::Update,
            }
        }
    }
}

/// Build the dry-run upgrade plan. Never mutates on-disk state; errors at any
/// step surface immediately with no partial plan.
pub fn build_upgrade_plan(
    sys: &dyn System,
    templates: &dyn TemplateSource,
    root: &Path,
    options: &PlanOptions,
) -> Result<UpgradePlan, AppError> {
    validate_root(root)?;
    let target_version = resolve_target_version(options)?;

    let entries = enumerate_templates(templates)?;
    let template_set: std::collections::BTreeSet<String> =
        entries.iter().map(|entry| entry.rel.clone()).collect();

    let mut additions: Vec<(PlanChange, String)> = Vec::new();
    let mut updates: Vec<PlanChange> = Vec::new();
    let mut section_updates: Vec<PlanChange> = Vec::new();

    for entry in &entries {
        let abs = abs_path(root, &entry.rel);
        let Some(info) = sys.stat(&abs)? else {
            additions.push((
                PlanChange { path: entry.rel.clone(), ownership: OwnershipInfo::addition() },
                hash_normalized(&entry.bytes),
            ));
            continue;
        };
        if !info.is_file() {
            return Err(AppError::validation(format!(
                "managed path '{}' exists but is not a regular file",
                entry.rel
            )));
        }

        let local_bytes = sys.read_file(&abs)?;
        let policy = policy_for(&entry.rel);
        let local_comparable = build_ownership_comparable(policy, &local_bytes).ok();

        // Equal under policy: nothing to plan. For section-aware policies this
        // compares managed sections only, so user entries below the marker
        // never make a file upgrade-eligible.
        if let Some(local) = &local_comparable
            && local.comparable_key() == entry.comparable.comparable_key()
        {
            continue;
        }

        let evidence =
            manifest_store::resolve_baseline(sys, root, &entry.rel, local_comparable.as_ref())?;
        let Some(assessment) =
            classify(policy, &local_bytes, &evidence, Some(&entry.comparable))
        else {
            continue;
        };

        let change = PlanChange { path: entry.rel.clone(), ownership: assessment.into() };
        if policy.is_section_aware() {
            section_updates.push(change);
        } else {
            updates.push(change);
        }
    }

    // Orphans: files under managed roots that are not in the template set.
    let mut orphans: Vec<(PlanChange, String)> = Vec::new();
    for orphan_rel in unknowns::scan_unknowns(sys, root, &template_set)? {
        let local_bytes = sys.read_file(&abs_path(root, &orphan_rel))?;
        let policy = policy_for(&orphan_rel);
        let local_comparable = build_ownership_comparable(policy, &local_bytes).ok();
        let evidence =
            manifest_store::resolve_baseline(sys, root, &orphan_rel, local_comparable.as_ref())?;
        if let Some(assessment) = classify(policy, &local_bytes, &evidence, None) {
            orphans.push((
                PlanChange { path: orphan_rel, ownership: assessment.into() },
                hash_normalized(&local_bytes),
            ));
        }
    }

    // Rename detection: a hash shared by exactly one addition and exactly one
    // orphan pairs them up.
    let mut by_hash: BTreeMap<String, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (index, (_, hash)) in additions.iter().enumerate() {
        by_hash.entry(hash.clone()).or_default().0.push(index);
    }
    for (index, (_, hash)) in orphans.iter().enumerate() {
        by_hash.entry(hash.clone()).or_default().1.push(index);
    }

    let mut renames = Vec::new();
    let mut claimed_additions = std::collections::BTreeSet::new();
    let mut claimed_orphans = std::collections::BTreeSet::new();
    for (added, orphaned) in by_hash.values() {
        if added.len() == 1 && orphaned.len() == 1 {
            claimed_additions.insert(added[0]);
            claimed_orphans.insert(orphaned[0]);
            renames.push(PlanRename {
                from: orphans[orphaned[0]].0.path.clone(),
                to: additions[added[0]].0.path.clone(),
                confidence: Confidence::High,
                detection: RENAME_DETECTION_UNIQUE_HASH.to_string(),
            });
        }
    }

    let mut template_additions: Vec<PlanChange> = additions
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !claimed_additions.contains(index))
        .map(|(_, (change, _))| change)
        .collect();
    let mut template_removals: Vec<PlanChange> = orphans
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !claimed_orphans.contains(index))
        .map(|(_, (change, _))| change)
        .collect();

    // Pin diff.
    let pin = manifest_store::read_pin(sys, root)?;
    let pin_change = PinVersionChange {
        current: pin.version.clone(),
        target: Some(target_version.clone()),
        action: pin_action(&pin, Some(&target_version)),
    };

    // Pending config-key migrations.
    let current_triplet =
        pin.version.as_deref().and_then(crate::domain::version::VersionTriplet::parse);
    let target_triplet = crate::domain::version::VersionTriplet::parse(&target_version)
        .ok_or_else(|| AppError::validation(format!("invalid target version '{target_version}'")))?;
    let mut config_key_migrations = Vec::new();
    for manifest in migrations::applicable_migrations(current_triplet, target_triplet)? {
        for op in &manifest.operations {
            match &op.action {
                MigrationAction::ConfigRenameKey { from_key, to_key } => {
                    config_key_migrations.push(ConfigKeyMigration {
                        op_id: op.id.clone(),
                        kind: "config_rename_key".to_string(),
                        from_key: Some(from_key.clone()),
                        to_key: Some(to_key.clone()),
                        key: None,
                    });
                }
                MigrationAction::ConfigSetDefault { key, .. } => {
                    config_key_migrations.push(ConfigKeyMigration {
                        op_id: op.id.clone(),
                        kind: "config_set_default".to_string(),
                        from_key: None,
                        to_key: None,
                        key: Some(key.clone()),
                    });
                }
                _ => {}
            }
        }
    }

    let readiness_checks = readiness::readiness_report(sys, root)?;

    template_additions.sort_by(|a, b| a.path.cmp(&b.path));
    updates.sort_by(|a, b| a.path.cmp(&b.path));
    section_updates.sort_by(|a, b| a.path.cmp(&b.path));
    renames.sort_by(|a, b| a.to.cmp(&b.to));
    template_removals.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(UpgradePlan {
        schema_version: PLAN_SCHEMA_VERSION,
        dry_run: true,
        template_additions,
        template_updates: updates,
        section_aware_updates: section_updates,
        template_renames: renames,
        template_removals_or_orphans: template_removals,
        config_key_migrations,
        pin_version_change: pin_change,
        readiness_checks,
    })
}

fn read_local_normalized(sys: &dyn System, root: &Path, rel: &str) -> Result<String, AppError> {
    let abs = abs_path(root, rel);
    match sys.stat(&abs)? {
        Some(_) => Ok(normalize(&String::from_utf8_lossy(&sys.read_file(&abs)?))),
        None => Ok(String::new()),
    }
}

fn read_template_normalized(
    templates: &dyn TemplateSource,
    rel: &str,
) -> Result<String, AppError> {
    Ok(normalize(&String::from_utf8_lossy(&templates.read(rel)?)))
}

/// Longest-common-subsequence line diff: lines only in `after` are added,
/// lines only in `before` are removed.
pub(crate) fn line_diff(before: &str, after: &str) -> (Vec<String>, Vec<String>) {
    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();
    let rows = before_lines.len();
    let cols = after_lines.len();

    let mut table = vec![vec![0usize; cols + 1]; rows + 1];
    for row in (0..rows).rev() {
        for col in (0..cols).rev() {
            table[row][col] = if before_lines[row] == after_lines[col] {
                table[row + 1][col + 1] + 1
            } else {
                table[row + 1][col].max(table[row][col + 1])
            };
        }
    }

    let mut removed = Vec::new();
    let mut added = Vec::new();
    let (mut row, mut col) = (0, 0);
    while row < rows && col < cols {
        if before_lines[row] == after_lines[col] {
            row += 1;
            col += 1;
        } else if table[row + 1][col] >= table[row][col + 1] {
            removed.push(before_lines[row].to_string());
            row += 1;
        } else {
            added.push(after_lines[col].to_string());
            col += 1;
        }
    }
    removed.extend(before_lines[row..].iter().map(|line| line.to_string()));
    added.extend(after_lines[col..].iter().map(|line| line.to_string()));
    (added, removed)
}

pub(crate) fn preview(
    path: &str,
    ownership: crate::domain::ownership::OwnershipLabel,
    before: String,
    after: String,
) -> DiffPreview {
    let (added_lines, removed_lines) = line_diff(&before, &after);
    DiffPreview { path: path.to_string(), ownership, before, after, added_lines, removed_lines }
}

/// Resolve content previews for every change in a plan. Read-only.
pub fn build_upgrade_plan_diff_previews(
    sys: &dyn System,
    templates: &dyn TemplateSource,
    root: &Path,
    plan: &UpgradePlan,
) -> Result<Vec<DiffPreview>, AppError> {
    validate_root(root)?;
    let mut previews = Vec::new();

    for change in &plan.template_additions {
        previews.push(preview(
            &change.path,
            change.ownership.ownership,
            String::new(),
            read_template_normalized(templates, &change.path)?,
        ));
    }
    for change in plan.template_updates.iter().chain(&plan.section_aware_updates) {
        previews.push(preview(
            &change.path,
            change.ownership.ownership,
            read_local_normalized(sys, root, &change.path)?,
            read_template_normalized(templates, &change.path)?,
        ));
    }
    for rename in &plan.template_renames {
        previews.push(preview(
            &rename.to,
            crate::domain::ownership::OwnershipLabel::UpstreamTemplateDelta,
            read_local_normalized(sys, root, &rename.from)?,
            read_template_normalized(templates, &rename.to)?,
        ));
    }
    for change in &plan.template_removals_or_orphans {
        previews.push(preview(
            &change.path,
            change.ownership.ownership,
            read_local_normalized(sys, root, &change.path)?,
            String::new(),
        ));
    }

    previews.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(previews)
}
