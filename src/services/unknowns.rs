//! Unknown-path manager: files under managed roots that are not known
//! templates, offered for prompted deletion in overwrite mode.

use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::AppError;
use crate::domain::paths::{MANAGED_ROOTS, abs_path, clean_rel_path};
use crate::ports::{Prompter, System};

fn rel_of(root: &Path, abs: &Path) -> String {
    let stripped = abs.strip_prefix(root).unwrap_or(abs);
    let joined = stripped
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");
    clean_rel_path(&joined)
}

/// Enumerate files under the managed roots that are not known templates,
/// sorted by repo-relative path.
pub fn scan_unknowns(
    sys: &dyn System,
    root: &Path,
    known_templates: &BTreeSet<String>,
) -> Result<Vec<String>, AppError> {
    let mut unknowns = Vec::new();
    for managed_root in MANAGED_ROOTS {
        sys.walk_dir(&abs_path(root, managed_root), &mut |path, info| {
            if info.is_file() {
                let rel = rel_of(root, path);
                if !known_templates.contains(&rel) {
                    unknowns.push(rel);
                }
            }
            Ok(())
        })?;
    }
    unknowns.sort();
    unknowns.dedup();
    Ok(unknowns)
}

fn is_empty_dir(sys: &dyn System, abs: &Path) -> Result<bool, AppError> {
    match sys.stat(abs)? {
        Some(info) if info.is_dir() => {}
        _ => return Ok(false),
    }
    let mut empty = true;
    sys.walk_dir(abs, &mut |_, _| {
        empty = false;
        Ok(())
    })?;
    Ok(empty)
}

/// Remove now-empty ancestors of a deleted file, stopping at the managed
/// roots themselves.
fn cleanup_empty_parents(sys: &dyn System, root: &Path, deleted_rel: &str) -> Result<(), AppError> {
    let mut current = deleted_rel.to_string();
    while let Some((parent, _)) = current.rsplit_once('/') {
        if MANAGED_ROOTS.contains(&parent) {
            break;
        }
        let parent_abs = abs_path(root, parent);
        if !is_empty_dir(sys, &parent_abs)? {
            break;
        }
        sys.remove_all(&parent_abs)?;
        current = parent.to_string();
    }
    Ok(())
}

/// In overwrite mode, offer deleting the unknowns: first all at once, then
/// one by one. Returns the deleted paths.
///
/// A missing prompter (or one without the deletion callbacks) while unknowns
/// exist is a fatal configuration error.
pub fn handle_unknowns(
    sys: &dyn System,
    root: &Path,
    unknowns: &[String],
    prompter: Option<&dyn Prompter>,
) -> Result<Vec<String>, AppError> {
    if unknowns.is_empty() {
        return Ok(Vec::new());
    }

    let prompter =
        prompter.ok_or(AppError::PrompterRequired("delete_unknown_all and delete_unknown"))?;
    let capabilities = prompter.capabilities();
    if !capabilities.delete_unknown_all || !capabilities.delete_unknown {
        return Err(AppError::PrompterRequired("delete_unknown_all and delete_unknown"));
    }

    let mut approved: Vec<String> = Vec::new();
    if prompter.delete_unknown_all(unknowns)? {
        approved.extend(unknowns.iter().cloned());
    } else {
        for unknown in unknowns {
            if prompter.delete_unknown(unknown)? {
                approved.push(unknown.clone());
            }
        }
    }

    let mut deleted = Vec::new();
    for rel in approved {
        sys.remove_all(&abs_path(root, &rel))?;
        cleanup_empty_parents(sys, root, &rel)?;
        deleted.push(rel);
    }
    Ok(deleted)
}
