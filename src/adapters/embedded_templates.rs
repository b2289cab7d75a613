//! `TemplateSource` over the assets compiled into the binary.
//!
//! The embedded tree has three siblings: `templates/` (the managed file tree,
//! keyed by repo-relative path), `manifests/` (one JSON manifest per shipped
//! version), and `migrations/` (one JSON migration manifest per target
//! version). Only `templates/` is reachable through `walk`, so installation
//! never sees manifest or migration assets.

use include_dir::{Dir, DirEntry, include_dir};

use crate::domain::AppError;
use crate::ports::TemplateSource;

static ASSETS: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/assets");

const TEMPLATES_PREFIX: &str = "templates";
const MANIFESTS_PREFIX: &str = "manifests";
const MIGRATIONS_PREFIX: &str = "migrations";

/// Template source backed by the embedded assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedTemplates;

impl EmbeddedTemplates {
    pub fn new() -> Self {
        EmbeddedTemplates
    }
}

fn collect_files<'d>(dir: &'d Dir<'d>, out: &mut Vec<&'d include_dir::File<'d>>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::File(file) => out.push(file),
            DirEntry::Dir(subdir) => collect_files(subdir, out),
        }
    }
}

fn sorted_files_under(
    prefix: &str,
) -> Result<Vec<&'static include_dir::File<'static>>, AppError> {
    let dir = ASSETS
        .get_dir(prefix)
        .ok_or_else(|| AppError::MissingAsset(format!("{prefix}/")))?;
    let mut files = Vec::new();
    collect_files(dir, &mut files);
    files.sort_by_key(|file| file.path().to_path_buf());
    Ok(files)
}

fn strip_prefix(embedded_path: &str, prefix: &str) -> String {
    embedded_path
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(embedded_path)
        .to_string()
}

impl TemplateSource for EmbeddedTemplates {
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        for file in sorted_files_under(TEMPLATES_PREFIX)? {
            let rel = strip_prefix(&file.path().to_string_lossy(), TEMPLATES_PREFIX);
            if root.is_empty() || rel == root || rel.starts_with(&format!("{root}/")) {
                visit(&rel, file.contents())?;
            }
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, AppError> {
        let embedded = format!("{TEMPLATES_PREFIX}/{path}");
        ASSETS
            .get_file(&embedded)
            .map(|file| file.contents().to_vec())
            .ok_or_else(|| AppError::MissingAsset(embedded))
    }
}

/// Embedded `(file stem, bytes)` pairs for every per-version template
/// manifest, sorted by name.
pub fn embedded_manifests() -> Result<Vec<(String, &'static [u8])>, AppError> {
    let mut out = Vec::new();
    for file in sorted_files_under(MANIFESTS_PREFIX)? {
        let name = strip_prefix(&file.path().to_string_lossy(), MANIFESTS_PREFIX);
        if let Some(stem) = name.strip_suffix(".json") {
            out.push((stem.to_string(), file.contents()));
        }
    }
    if out.is_empty() {
        return Err(AppError::MissingAsset("manifests/*.json".to_string()));
    }
    Ok(out)
}

/// Embedded `(file stem, bytes)` pairs for every migration manifest, sorted
/// by name. An empty migrations directory is legal.
pub fn embedded_migrations() -> Vec<(String, &'static [u8])> {
    let mut out = Vec::new();
    if let Ok(files) = sorted_files_under(MIGRATIONS_PREFIX) {
        for file in files {
            let name = strip_prefix(&file.path().to_string_lossy(), MIGRATIONS_PREFIX);
            if let Some(stem) = name.strip_suffix(".json") {
                out.push((stem.to_string(), file.contents()));
            }
        }
    }
    out
}
