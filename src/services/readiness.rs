//! Readiness checker: pure read-only diagnostics over the parsed config,
//! `.agent-layer/.env`, and generated launcher outputs. Findings are
//! non-fatal and deterministic.

use std::path::Path;

use crate::domain::AppError;
use crate::domain::config::{self, StrictConfig};
use crate::domain::dotenv::{ParsedDotenv, parse_dotenv};
use crate::domain::paths::{CONFIG_FILE, ENV_FILE, abs_path};
use crate::domain::readiness::{ReadinessFinding, finding, sort_findings};
use crate::domain::version::VersionTriplet;
use crate::ports::System;
use crate::services::launchers;

/// Produce the sorted readiness findings for a repo.
pub fn readiness_report(sys: &dyn System, root: &Path) -> Result<Vec<ReadinessFinding>, AppError> {
    let mut findings = Vec::new();

    let config_path = abs_path(root, CONFIG_FILE);
    let config_stat = sys.stat(&config_path)?;
    let (loose, strict) = match &config_stat {
        Some(_) => {
            let bytes = sys.read_file(&config_path)?;
            let loose = config::parse_loose(&bytes)
                .map_err(|reason| AppError::schema("config", CONFIG_FILE, reason))?;
            let strict = config::recognized_subset(&loose);
            (Some(loose), strict)
        }
        None => (None, StrictConfig::default()),
    };

    let env_path = abs_path(root, ENV_FILE);
    let dotenv = match sys.stat(&env_path)? {
        Some(_) => parse_dotenv(&sys.read_file(&env_path)?),
        None => ParsedDotenv::default(),
    };

    check_required_fields(&loose, &strict, &mut findings);
    if let Some(loose) = &loose {
        check_unrecognized_keys(loose, &mut findings);
        check_placeholders(sys, loose, &dotenv, &mut findings);
    }
    check_env_overrides(sys, &dotenv, &mut findings);
    check_empty_assignments(&dotenv, &mut findings);
    check_path_anomalies(sys, &strict, &mut findings);
    check_launcher_staleness(sys, root, config_stat.map(|info| info.modified_unix), &strict, &mut findings)?;
    check_dependency_specs(&strict, &mut findings);
    check_secret_risk(sys, root, &dotenv, &mut findings)?;

    sort_findings(&mut findings);
    Ok(findings)
}

fn check_required_fields(
    loose: &Option<toml::Value>,
    strict: &StrictConfig,
    findings: &mut Vec<ReadinessFinding>,
) {
    let mut missing = Vec::new();
    if loose.is_none() {
        missing.push(format!("{CONFIG_FILE} does not exist"));
    } else if strict.schema_version.is_none() {
        missing.push("schema_version".to_string());
    }
    if !missing.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::MISSING_REQUIRED_CONFIG_FIELDS,
            "required config fields are missing",
            missing,
        ));
    }
}

fn check_unrecognized_keys(loose: &toml::Value, findings: &mut Vec<ReadinessFinding>) {
    let unknown = config::unrecognized_keys(loose);
    if !unknown.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::UNRECOGNIZED_CONFIG_KEYS,
            "config contains keys the engine does not recognize",
            unknown,
        ));
    }
}

/// Extract `${VAR}` placeholder names from a string value.
fn placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) => {
                let name = &tail[..end];
                if !name.is_empty() {
                    names.push(name.to_string());
                }
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
    names
}

fn check_placeholders(
    sys: &dyn System,
    loose: &toml::Value,
    dotenv: &ParsedDotenv,
    findings: &mut Vec<ReadinessFinding>,
) {
    let mut unresolved = Vec::new();
    for (path, value) in config::string_values(loose) {
        for name in placeholders(&value) {
            let resolved =
                sys.lookup_env(&name).is_some() || dotenv.values.contains_key(&name);
            if !resolved {
                unresolved.push(format!("{path}: ${{{name}}}"));
            }
        }
    }
    if !unresolved.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::UNRESOLVED_CONFIG_PLACEHOLDERS,
            "config placeholders resolve in neither .env nor the process environment",
            unresolved,
        ));
    }
}

fn check_env_overrides(
    sys: &dyn System,
    dotenv: &ParsedDotenv,
    findings: &mut Vec<ReadinessFinding>,
) {
    let mut overridden = Vec::new();
    for (key, value) in &dotenv.values {
        if let Some(process_value) = sys.lookup_env(key)
            && process_value != *value
        {
            overridden.push(key.clone());
        }
    }
    if !overridden.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::PROCESS_ENV_OVERRIDES_DOTENV,
            "process environment overrides .env assignments",
            overridden,
        ));
    }
}

fn check_empty_assignments(dotenv: &ParsedDotenv, findings: &mut Vec<ReadinessFinding>) {
    if !dotenv.empty_assignments.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::IGNORED_EMPTY_DOTENV_ASSIGNMENTS,
            ".env assigns empty values that are ignored at resolution",
            dotenv.empty_assignments.clone(),
        ));
    }
}

fn check_path_anomalies(
    sys: &dyn System,
    strict: &StrictConfig,
    findings: &mut Vec<ReadinessFinding>,
) {
    let Some(tools) = &strict.tools else { return };
    let mut anomalies = Vec::new();
    for path in &tools.extra_paths {
        if path.starts_with('~') && sys.lookup_env("HOME").is_none() {
            anomalies.push(format!("{path}: '~' cannot expand without HOME"));
        }
        if path.split('/').any(|component| component == "..") {
            anomalies.push(format!("{path}: contains '..'"));
        }
    }
    if !anomalies.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::PATH_EXPANSION_ANOMALIES,
            "configured paths will not expand cleanly",
            anomalies,
        ));
    }
}

fn check_launcher_staleness(
    sys: &dyn System,
    root: &Path,
    config_mtime: Option<Option<i64>>,
    strict: &StrictConfig,
    findings: &mut Vec<ReadinessFinding>,
) -> Result<(), AppError> {
    let Some(config_mtime) = config_mtime.flatten() else {
        return Ok(());
    };

    let mut stale = Vec::new();
    let mut disabled_leftovers = Vec::new();
    for (agent, settings) in &strict.agents {
        let rel = launchers::launcher_rel_path(agent);
        let launcher_stat = sys.stat(&abs_path(root, &rel))?;

        if settings.enabled && settings.output.as_deref() == Some("tasks") {
            match launcher_stat.and_then(|info| info.modified_unix) {
                Some(launcher_mtime) if launcher_mtime >= config_mtime => {}
                Some(_) => stale.push(format!("{rel}: older than {CONFIG_FILE}")),
                None => stale.push(format!("{rel}: never generated")),
            }
        } else if launcher_stat.is_some() {
            disabled_leftovers.push(rel);
        }
    }

    if !stale.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::VSCODE_NO_SYNC_OUTPUTS_STALE,
            "generated VS Code outputs are older than the config",
            stale,
        ));
    }
    if !disabled_leftovers.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::STALE_DISABLED_AGENT_ARTIFACTS,
            "disabled agents still have generated artifacts on disk",
            disabled_leftovers,
        ));
    }
    Ok(())
}

fn check_dependency_specs(strict: &StrictConfig, findings: &mut Vec<ReadinessFinding>) {
    let Some(dependencies) = &strict.dependencies else { return };
    let mut floating = Vec::new();
    for spec in &dependencies.external {
        let pinned = spec
            .split_once('@')
            .map(|(name, version)| {
                !name.is_empty() && VersionTriplet::parse(version).is_some()
            })
            .unwrap_or(false);
        if !pinned {
            floating.push(spec.clone());
        }
    }
    if !floating.is_empty() {
        findings.push(ReadinessFinding::new(
            finding::FLOATING_EXTERNAL_DEPENDENCY_SPECS,
            "external dependency specs are not pinned to an exact version",
            floating,
        ));
    }
}

fn check_secret_risk(
    sys: &dyn System,
    root: &Path,
    dotenv: &ParsedDotenv,
    findings: &mut Vec<ReadinessFinding>,
) -> Result<(), AppError> {
    const MARKERS: [&str; 4] = ["TOKEN", "SECRET", "KEY", "PASSWORD"];
    let risky: Vec<String> = dotenv
        .values
        .keys()
        .filter(|key| {
            let upper = key.to_uppercase();
            MARKERS.iter().any(|marker| upper.contains(marker))
        })
        .cloned()
        .collect();

    if !risky.is_empty() && !launchers::gitignore_covers_env(sys, root)? {
        findings.push(ReadinessFinding::new(
            finding::GENERATED_SECRET_RISK,
            ".env holds secret-like values and is not ignored by git",
            risky,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemSystem;

    fn root() -> &'static Path {
        Path::new("/repo")
    }

    fn find<'f>(findings: &'f [ReadinessFinding], id: &str) -> Option<&'f ReadinessFinding> {
        findings.iter().find(|finding| finding.id == id)
    }

    #[test]
    fn clean_repo_yields_no_findings() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n");
        let findings = readiness_report(&sys, root()).unwrap();
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn unknown_keys_and_missing_schema_version_are_reported() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"mystery = true\n");
        let findings = readiness_report(&sys, root()).unwrap();

        let unknown = find(&findings, finding::UNRECOGNIZED_CONFIG_KEYS).unwrap();
        assert_eq!(unknown.details, vec!["mystery".to_string()]);
        assert!(find(&findings, finding::MISSING_REQUIRED_CONFIG_FIELDS).is_some());
    }

    #[test]
    fn unresolved_placeholders_are_reported() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            b"schema_version = 1\n\n[tools]\nallow_extra = [\"${NOPE}\"]\n",
        );
        let findings = readiness_report(&sys, root()).unwrap();
        let unresolved = find(&findings, finding::UNRESOLVED_CONFIG_PLACEHOLDERS).unwrap();
        assert_eq!(unresolved.details, vec!["tools.allow_extra[0]: ${NOPE}".to_string()]);
    }

    #[test]
    fn placeholders_resolved_by_dotenv_or_process_env_pass() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            b"schema_version = 1\n\n[tools]\nallow_extra = [\"${FROM_ENV}\", \"${FROM_PROC}\"]\n",
        );
        sys.add_file("/repo/.agent-layer/.env", b"FROM_ENV=x\n");
        sys.set_env("FROM_PROC", "y");
        let findings = readiness_report(&sys, root()).unwrap();
        assert!(find(&findings, finding::UNRESOLVED_CONFIG_PLACEHOLDERS).is_none());
    }

    #[test]
    fn env_overrides_and_empty_assignments_are_reported() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n");
        sys.add_file("/repo/.agent-layer/.env", b"AL_MODE=fast\nAL_EMPTY=\n");
        sys.set_env("AL_MODE", "slow");

        let findings = readiness_report(&sys, root()).unwrap();
        let overrides = find(&findings, finding::PROCESS_ENV_OVERRIDES_DOTENV).unwrap();
        assert_eq!(overrides.details, vec!["AL_MODE".to_string()]);
        let empty = find(&findings, finding::IGNORED_EMPTY_DOTENV_ASSIGNMENTS).unwrap();
        assert_eq!(empty.details, vec!["AL_EMPTY".to_string()]);
    }

    #[test]
    fn path_anomalies_cover_tilde_and_dotdot() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            b"schema_version = 1\n\n[tools]\nextra_paths = [\"~/bin\", \"../outside\"]\n",
        );
        let findings = readiness_report(&sys, root()).unwrap();
        let anomalies = find(&findings, finding::PATH_EXPANSION_ANOMALIES).unwrap();
        assert_eq!(anomalies.details.len(), 2);
    }

    #[test]
    fn stale_and_disabled_launchers_are_reported() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.vscode/agent-layer.vscode.json", b"{}\n");
        sys.add_file("/repo/.vscode/agent-layer.zed.json", b"{}\n");
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            br#"schema_version = 1

[agents.vscode]
enabled = true
output = "tasks"

[agents.zed]
enabled = false
"#,
        );
        // Config written after both launchers, so vscode's output is stale.
        let findings = readiness_report(&sys, root()).unwrap();
        let stale = find(&findings, finding::VSCODE_NO_SYNC_OUTPUTS_STALE).unwrap();
        assert_eq!(stale.details.len(), 1);
        let disabled = find(&findings, finding::STALE_DISABLED_AGENT_ARTIFACTS).unwrap();
        assert_eq!(disabled.details, vec![".vscode/agent-layer.zed.json".to_string()]);
    }

    #[test]
    fn floating_dependency_specs_are_reported() {
        let sys = MemSystem::new();
        sys.add_file(
            "/repo/.agent-layer/config.toml",
            br#"schema_version = 1

[dependencies]
external = ["markdownlint@0.39.0", "prettier@latest", "eslint"]
"#,
        );
        let findings = readiness_report(&sys, root()).unwrap();
        let floating = find(&findings, finding::FLOATING_EXTERNAL_DEPENDENCY_SPECS).unwrap();
        assert_eq!(
            floating.details,
            vec!["eslint".to_string(), "prettier@latest".to_string()]
        );
    }

    #[test]
    fn secret_risk_requires_unignored_env() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"schema_version = 1\n");
        sys.add_file("/repo/.agent-layer/.env", b"AL_API_TOKEN=abc123\n");

        let findings = readiness_report(&sys, root()).unwrap();
        assert!(find(&findings, finding::GENERATED_SECRET_RISK).is_some());

        sys.add_file(
            "/repo/.gitignore",
            b"# agent-layer (managed)\n.agent-layer/state/\n.agent-layer/.env\n# end agent-layer\n",
        );
        let findings = readiness_report(&sys, root()).unwrap();
        assert!(find(&findings, finding::GENERATED_SECRET_RISK).is_none());
    }

    #[test]
    fn findings_are_sorted_by_id() {
        let sys = MemSystem::new();
        sys.add_file("/repo/.agent-layer/config.toml", b"mystery = true\n");
        sys.add_file("/repo/.agent-layer/.env", b"AL_EMPTY=\n");
        let findings = readiness_report(&sys, root()).unwrap();
        let ids: Vec<&str> = findings.iter().map(|finding| finding.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
