//! Manifest and baseline store: embedded per-version manifests, the persisted
//! managed-baseline file, and baseline-evidence resolution.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::adapters::embedded_manifests;
use crate::domain::AppError;
use crate::domain::baseline::BaselineState;
use crate::domain::comparable::{OwnershipComparable, build_ownership_comparable};
use crate::domain::manifest::TemplateManifest;
use crate::domain::ownership::{BaselineEvidence, BaselineSource, reason};
use crate::domain::paths::{
    self, BASELINE_STATE_FILE, LEGACY_DOCS_SNAPSHOT_DIR, PIN_FILE, abs_path,
};
use crate::domain::version::normalize_version;
use crate::ports::System;

static MANIFEST_CACHE: Mutex<Option<Arc<BTreeMap<String, TemplateManifest>>>> = Mutex::new(None);

/// Load every embedded manifest, memoized once per process.
///
/// Errors on any decode, validation, or duplicate-version failure, and when
/// no manifests are embedded at all.
pub fn load_all_manifests() -> Result<Arc<BTreeMap<String, TemplateManifest>>, AppError> {
    let mut cache = MANIFEST_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(manifests) = cache.as_ref() {
        return Ok(Arc::clone(manifests));
    }

    let mut manifests = BTreeMap::new();
    for (stem, bytes) in embedded_manifests()? {
        let manifest: TemplateManifest = serde_json::from_slice(bytes).map_err(|err| {
            AppError::schema("template manifest", format!("manifests/{stem}.json"), err.to_string())
        })?;
        manifest.validate().map_err(|reason| {
            AppError::schema("template manifest", format!("manifests/{stem}.json"), reason)
        })?;
        if manifest.version != stem {
            return Err(AppError::schema(
                "template manifest",
                format!("manifests/{stem}.json"),
                format!("embedded version '{}' does not match file stem", manifest.version),
            ));
        }
        if manifests.insert(manifest.version.clone(), manifest).is_some() {
            return Err(AppError::schema(
                "template manifest",
                format!("manifests/{stem}.json"),
                "duplicate manifest version",
            ));
        }
    }

    let manifests = Arc::new(manifests);
    *cache = Some(Arc::clone(&manifests));
    Ok(manifests)
}

/// Drop the process-wide manifest memo. Test hook.
pub fn reset_manifests_for_test() {
    let mut cache = MANIFEST_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *cache = None;
}

/// Load one embedded manifest by version (any parseable spelling).
pub fn load_manifest(version: &str) -> Result<TemplateManifest, AppError> {
    let normalized = normalize_version(version)
        .ok_or_else(|| AppError::validation(format!("invalid manifest version '{version}'")))?;
    let manifests = load_all_manifests()?;
    manifests
        .get(&normalized)
        .cloned()
        .ok_or_else(|| AppError::MissingAsset(format!("manifests/{normalized}.json")))
}

/// Render a persisted JSON document: two-space indent, trailing newline.
pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    let mut rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::validation(format!("failed to serialize state: {err}")))?;
    rendered.push('\n');
    Ok(rendered)
}

/// Read the persisted baseline state. `Ok(None)` when no file exists.
pub fn read_baseline_state(
    sys: &dyn System,
    root: &Path,
) -> Result<Option<BaselineState>, AppError> {
    let path = abs_path(root, BASELINE_STATE_FILE);
    if sys.stat(&path)?.is_none() {
        return Ok(None);
    }
    let bytes = sys.read_file(&path)?;
    let state: BaselineState = serde_json::from_slice(&bytes)
        .map_err(|err| AppError::schema("baseline state", BASELINE_STATE_FILE, err.to_string()))?;
    state
        .validate()
        .map_err(|reason| AppError::schema("baseline state", BASELINE_STATE_FILE, reason))?;
    Ok(Some(state))
}

/// Write the baseline state atomically.
///
/// `created_at_utc` is preserved from any prior state on disk; a blank
/// created-at (prior or incoming) is replaced with `now_utc`.
pub fn write_baseline_state(
    sys: &dyn System,
    root: &Path,
    mut state: BaselineState,
    now_utc: &str,
) -> Result<BaselineState, AppError> {
    if let Some(prior) = read_baseline_state(sys, root)?
        && !prior.created_at_utc.is_empty()
    {
        state.created_at_utc = prior.created_at_utc;
    }
    if state.created_at_utc.is_empty() {
        state.created_at_utc = now_utc.to_string();
    }
    state.updated_at_utc = now_utc.to_string();

    state
        .validate()
        .map_err(|reason| AppError::schema("baseline state", BASELINE_STATE_FILE, reason))?;
    let rendered = to_pretty_json(&state)?;
    sys.write_file_atomic(&abs_path(root, BASELINE_STATE_FILE), rendered.as_bytes(), 0o644)?;
    Ok(state)
}

/// What the pin file currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinRead {
    /// Normalized pin version, when present and parseable.
    pub version: Option<String>,
    /// Whether a non-empty pin file exists at all.
    pub exists: bool,
    /// A non-empty pin that did not parse as semver.
    pub unparseable: bool,
    pub warnings: Vec<String>,
}

/// Read the pin file. An absent or empty pin is unpinned (empty emits a
/// warning); unparseable content is flagged but never an error.
pub fn read_pin(sys: &dyn System, root: &Path) -> Result<PinRead, AppError> {
    let path = abs_path(root, PIN_FILE);
    let mut pin = PinRead::default();
    if sys.stat(&path)?.is_none() {
        return Ok(pin);
    }
    let bytes = sys.read_file(&path)?;
    let raw = String::from_utf8_lossy(&bytes);
    if raw.trim().is_empty() {
        pin.warnings.push(format!("pin file '{PIN_FILE}' is empty; treating as unpinned"));
        return Ok(pin);
    }
    pin.exists = true;
    pin.version = normalize_version(&raw);
    pin.unparseable = pin.version.is_none();
    Ok(pin)
}

/// Normalized pin version plus warnings, for callers that only need those.
pub fn read_pin_version(
    sys: &dyn System,
    root: &Path,
) -> Result<(Option<String>, Vec<String>), AppError> {
    let pin = read_pin(sys, root)?;
    Ok((pin.version, pin.warnings))
}

/// Pick the best baseline evidence for a path, in priority order: the
/// persisted baseline state, the pinned version's manifest, any manifest
/// whose entry matches the local content, then the legacy docs snapshot.
pub fn resolve_baseline(
    sys: &dyn System,
    root: &Path,
    rel_path: &str,
    local: Option<&OwnershipComparable>,
) -> Result<BaselineEvidence, AppError> {
    let mut reasons: Vec<String> = Vec::new();

    // 1. Persisted baseline state.
    if let Some(state) = read_baseline_state(sys, root)?
        && let Some(entry) = state.entry_for(rel_path)
    {
        return Ok(match entry.baseline_comparable() {
            Ok(comparable) => BaselineEvidence {
                comparable: Some(comparable),
                reasons,
                confidence: Some(state.source.confidence()),
                source: Some(state.source),
            },
            Err(_) => BaselineEvidence::unavailable(reason::POLICY_PAYLOAD_INVALID),
        });
    }

    // 2. The pinned version's manifest.
    let (pin, _) = read_pin_version(sys, root)?;
    match pin {
        Some(version) => match load_manifest(&version) {
            Ok(manifest) => {
                if let Some(entry) = manifest.entry_for(rel_path) {
                    return Ok(match entry.baseline_comparable() {
                        Ok(comparable) => BaselineEvidence {
                            comparable: Some(comparable),
                            reasons,
                            confidence: Some(
                                BaselineSource::InferredFromPinManifest.confidence(),
                            ),
                            source: Some(BaselineSource::InferredFromPinManifest),
                        },
                        Err(_) => BaselineEvidence::unavailable(reason::POLICY_PAYLOAD_INVALID),
                    });
                }
            }
            Err(AppError::MissingAsset(_)) => {
                reasons.push(reason::PIN_MANIFEST_MISSING.to_string());
            }
            Err(err) => return Err(err),
        },
        None => {}
    }

    // 3. Any manifest whose entry for this path matches the local content.
    if let Some(local) = local {
        let manifests = load_all_manifests()?;
        for manifest in manifests.values() {
            if let Some(entry) = manifest.entry_for(rel_path)
                && let Ok(comparable) = entry.baseline_comparable()
                && comparable.comparable_key() == local.comparable_key()
            {
                reasons.push(reason::MANAGED_SECTION_MATCHES_OTHER_VERSION.to_string());
                return Ok(BaselineEvidence {
                    comparable: Some(comparable),
                    reasons,
                    confidence: Some(BaselineSource::InferredFromPinManifest.confidence()),
                    source: Some(BaselineSource::InferredFromPinManifest),
                });
            }
        }
    }

    // 4. Legacy docs snapshot.
    if let Some(rest) = rel_path.strip_prefix("docs/") {
        let legacy_rel = format!("{LEGACY_DOCS_SNAPSHOT_DIR}/{rest}");
        let legacy_abs = abs_path(root, &legacy_rel);
        if sys.stat(&legacy_abs)?.is_some() {
            let bytes = sys.read_file(&legacy_abs)?;
            if let Ok(comparable) =
                build_ownership_comparable(paths::policy_for(rel_path), &bytes)
            {
                return Ok(BaselineEvidence {
                    comparable: Some(comparable),
                    reasons,
                    confidence: Some(
                        BaselineSource::MigratedFromLegacyDocsSnapshot.confidence(),
                    ),
                    source: Some(BaselineSource::MigratedFromLegacyDocsSnapshot),
                });
            }
        }
    }

    reasons.push(reason::BASELINE_MISSING.to_string());
    Ok(BaselineEvidence { comparable: None, reasons, confidence: None, source: None })
}
