//! Transactional snapshot and rollback: content-addressed pre-state capture
//! of every path a mutating run may touch, with atomic restore on failure.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::AppError;
use crate::domain::paths::{SNAPSHOT_DIR, abs_path, clean_rel_path, depth};
use crate::domain::snapshot::{
    SNAPSHOT_SCHEMA_VERSION, SnapshotEntry, SnapshotEntryKind, SnapshotStatus, UpgradeSnapshot,
};
use crate::ports::{FileKind, System};

/// Snapshot files larger than this trigger a non-fatal warning.
pub const SNAPSHOT_WARN_BYTES: u64 = 50 * 1024 * 1024;

/// How many snapshots to retain after a run.
pub const SNAPSHOT_RETAIN: usize = 20;

/// Snapshot id: wall-clock second plus unix nanos for uniqueness.
pub fn new_snapshot_id(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), now.timestamp_nanos_opt().unwrap_or_default())
}

fn rel_of(root: &Path, abs: &Path) -> String {
    let stripped = abs.strip_prefix(root).unwrap_or(abs);
    let joined = stripped
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");
    clean_rel_path(&joined)
}

fn insert_entry(entries: &mut BTreeMap<String, SnapshotEntry>, entry: SnapshotEntry) {
    match entries.get(&entry.path) {
        // A non-absent record replaces an absent one; never the reverse.
        Some(existing) if existing.kind != SnapshotEntryKind::Absent => {}
        _ => {
            entries.insert(entry.path.clone(), entry);
        }
    }
}

/// Capture the pre-state of every target path.
///
/// Targets are cleaned relative paths, deduplicated by the caller's set.
/// Regular files are captured with content and permissions, directories
/// recursively; any other file type is an error.
pub fn capture(
    sys: &dyn System,
    root: &Path,
    targets: &BTreeSet<String>,
    snapshot_id: &str,
    created_at_utc: &str,
) -> Result<UpgradeSnapshot, AppError> {
    let mut entries: BTreeMap<String, SnapshotEntry> = BTreeMap::new();

    for target in targets {
        let rel = clean_rel_path(target);
        if rel.is_empty() {
            continue;
        }
        let abs = abs_path(root, &rel);
        match sys.stat(&abs)? {
            None => insert_entry(&mut entries, SnapshotEntry::absent(rel)),
            Some(info) if info.kind == FileKind::File => {
                let bytes = sys.read_file(&abs)?;
                insert_entry(&mut entries, SnapshotEntry::file(rel, info.perm, &bytes));
            }
            Some(info) if info.kind == FileKind::Dir => {
                insert_entry(&mut entries, SnapshotEntry::dir(rel, info.perm));
                sys.walk_dir(&abs, &mut |child, child_info| {
                    let child_rel = rel_of(root, child);
                    match child_info.kind {
                        FileKind::File => {
                            let bytes = sys.read_file(child)?;
                            insert_entry(
                                &mut entries,
                                SnapshotEntry::file(child_rel, child_info.perm, &bytes),
                            );
                            Ok(())
                        }
                        FileKind::Dir => {
                            insert_entry(
                                &mut entries,
                                SnapshotEntry::dir(child_rel, child_info.perm),
                            );
                            Ok(())
                        }
                        FileKind::Other => Err(AppError::validation(format!(
                            "cannot snapshot '{child_rel}': unsupported file type"
                        ))),
                    }
                })?;
            }
            Some(_) => {
                return Err(AppError::validation(format!(
                    "cannot snapshot '{rel}': unsupported file type"
                )));
            }
        }
    }

    let snapshot = UpgradeSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        snapshot_id: snapshot_id.to_string(),
        created_at_utc: created_at_utc.to_string(),
        status: SnapshotStatus::Created,
        failure_step: None,
        failure_error: None,
        entries: entries.into_values().collect(),
    };
    snapshot
        .validate()
        .map_err(|reason| AppError::schema("upgrade snapshot", snapshot_id, reason))?;
    Ok(snapshot)
}

fn snapshot_rel_path(snapshot_id: &str) -> String {
    format!("{SNAPSHOT_DIR}/{snapshot_id}.json")
}

/// Validate and atomically write a snapshot. Returns a size warning when the
/// serialized form exceeds [`SNAPSHOT_WARN_BYTES`].
pub fn write(
    sys: &dyn System,
    root: &Path,
    snapshot: &UpgradeSnapshot,
) -> Result<Option<String>, AppError> {
    snapshot
        .validate()
        .map_err(|reason| AppError::schema("upgrade snapshot", &snapshot.snapshot_id, reason))?;

    let rendered = super::manifest_store::to_pretty_json(snapshot)?;
    let rel = snapshot_rel_path(&snapshot.snapshot_id);
    sys.write_file_atomic(&abs_path(root, &rel), rendered.as_bytes(), 0o644)?;

    if rendered.len() as u64 > SNAPSHOT_WARN_BYTES {
        return Ok(Some(format!(
            "snapshot '{}' is {} bytes (over the {} byte advisory limit)",
            snapshot.snapshot_id,
            rendered.len(),
            SNAPSHOT_WARN_BYTES
        )));
    }
    Ok(None)
}

/// Read one snapshot by id, validating it.
pub fn read(sys: &dyn System, root: &Path, snapshot_id: &str) -> Result<UpgradeSnapshot, AppError> {
    let rel = snapshot_rel_path(snapshot_id);
    let bytes = sys.read_file(&abs_path(root, &rel))?;
    let snapshot: UpgradeSnapshot = serde_json::from_slice(&bytes)
        .map_err(|err| AppError::schema("upgrade snapshot", &rel, err.to_string()))?;
    snapshot.validate().map_err(|reason| AppError::schema("upgrade snapshot", &rel, reason))?;
    Ok(snapshot)
}

/// List snapshots newest-first. Unreadable or malformed files are skipped so
/// operators can always enumerate what remains.
pub fn list(sys: &dyn System, root: &Path) -> Result<Vec<UpgradeSnapshot>, AppError> {
    let dir = abs_path(root, SNAPSHOT_DIR);
    let mut snapshots = Vec::new();

    sys.walk_dir(&dir, &mut |path, info| {
        let is_json = path
            .extension()
            .map(|ext| ext.to_string_lossy() == "json")
            .unwrap_or(false);
        if !info.is_file() || !is_json {
            return Ok(());
        }
        let Ok(bytes) = sys.read_file(path) else {
            return Ok(());
        };
        let Ok(snapshot) = serde_json::from_slice::<UpgradeSnapshot>(&bytes) else {
            return Ok(());
        };
        if snapshot.validate().is_ok() {
            snapshots.push(snapshot);
        }
        Ok(())
    })?;

    snapshots.sort_by(|a, b| {
        b.created_at_utc
            .cmp(&a.created_at_utc)
            .then_with(|| b.snapshot_id.cmp(&a.snapshot_id))
    });
    Ok(snapshots)
}

/// Retain the [`SNAPSHOT_RETAIN`] most recent snapshots, deleting the rest.
pub fn prune(sys: &dyn System, root: &Path) -> Result<(), AppError> {
    let snapshots = list(sys, root)?;
    for stale in snapshots.iter().skip(SNAPSHOT_RETAIN) {
        sys.remove_all(&abs_path(root, &snapshot_rel_path(&stale.snapshot_id)))?;
    }
    Ok(())
}

/// Restore the captured pre-state: paths the run created are removed
/// deepest-first, then files and directories are restored shallowest-first
/// with their captured permissions.
pub fn rollback(sys: &dyn System, root: &Path, snapshot: &UpgradeSnapshot) -> Result<(), AppError> {
    snapshot
        .validate()
        .map_err(|reason| AppError::schema("upgrade snapshot", &snapshot.snapshot_id, reason))?;

    let mut removals: Vec<&SnapshotEntry> = snapshot
        .entries
        .iter()
        .filter(|entry| entry.kind == SnapshotEntryKind::Absent)
        .collect();
    removals.sort_by(|a, b| depth(&b.path).cmp(&depth(&a.path)).then_with(|| b.path.cmp(&a.path)));
    for entry in removals {
        let abs = abs_path(root, &entry.path);
        if sys.stat(&abs)?.is_some() {
            sys.remove_all(&abs)?;
        }
    }

    let mut restores: Vec<&SnapshotEntry> = snapshot
        .entries
        .iter()
        .filter(|entry| entry.kind != SnapshotEntryKind::Absent)
        .collect();
    restores.sort_by(|a, b| depth(&a.path).cmp(&depth(&b.path)).then_with(|| a.path.cmp(&b.path)));
    for entry in restores {
        let abs = abs_path(root, &entry.path);
        match entry.kind {
            SnapshotEntryKind::Dir => {
                sys.mkdir_all(&abs, entry.perm.unwrap_or(0o755))?;
            }
            SnapshotEntryKind::File => {
                if let Some(info) = sys.stat(&abs)?
                    && info.kind == FileKind::Dir
                {
                    sys.remove_all(&abs)?;
                }
                let content = entry.decoded_content().map_err(|reason| {
                    AppError::schema("upgrade snapshot", &snapshot.snapshot_id, reason)
                })?;
                sys.write_file_atomic(&abs, &content, entry.perm.unwrap_or(0o644))?;
            }
            SnapshotEntryKind::Absent => unreachable!("filtered above"),
        }
    }
    Ok(())
}

/// Persist a status transition on an already-written snapshot.
pub fn update_status(
    sys: &dyn System,
    root: &Path,
    snapshot: &mut UpgradeSnapshot,
    status: SnapshotStatus,
    failure_step: Option<String>,
    failure_error: Option<String>,
) -> Result<(), AppError> {
    snapshot.status = status;
    snapshot.failure_step = failure_step;
    snapshot.failure_error = failure_error;
    write(sys, root, snapshot).map(|_| ())
}
