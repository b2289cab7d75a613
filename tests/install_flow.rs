//! Installer runs against a real filesystem root: init, upgrade, and the
//! overwrite/rollback paths.

mod common;

use std::path::Path;

use al::domain::snapshot::SnapshotStatus;
use al::services::installer::{self, RunMode, RunOptions};
use al::testing::{MemSystem, MemTemplates, ScriptedPrompter};
use al::{AppError, RunReport};

use common::{TestContext, seed_v030};

fn init(ctx: &TestContext) -> RunReport {
    al::run(ctx.root(), None, &RunOptions::init()).expect("init should succeed")
}

#[test]
fn init_materializes_templates_pin_gitignore_and_baseline() {
    let ctx = TestContext::new();
    let report = init(&ctx);

    assert_eq!(report.target_version, "0.4.0");
    assert_eq!(
        ctx.read(".agent-layer/instructions/core.md"),
        ctx.template(".agent-layer/instructions/core.md")
    );
    assert_eq!(ctx.read(".agent-layer/al.version"), "0.4.0\n");
    assert!(ctx.read(".gitignore").contains(".agent-layer/state/"));

    assert!(report.baseline_written);
    let baseline = ctx.read(".agent-layer/state/managed-baseline.json");
    assert!(baseline.contains("\"written_by_init\""));
    assert!(baseline.ends_with('\n'));

    let snapshots = al::list_upgrade_snapshots(ctx.root()).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, SnapshotStatus::Applied);
}

#[test]
fn init_refuses_an_existing_workspace() {
    let ctx = TestContext::new();
    init(&ctx);
    let err = al::run(ctx.root(), None, &RunOptions::init()).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn upgrade_on_a_pristine_install_changes_nothing_but_refreshes_baseline() {
    let ctx = TestContext::new();
    init(&ctx);
    let before = ctx.read(".agent-layer/state/managed-baseline.json");

    let report =
        al::run(ctx.root(), None, &RunOptions::upgrade()).expect("upgrade should succeed");
    assert!(report.written_templates.is_empty());
    assert!(report.baseline_written);

    // created_at_utc survives the overwrite.
    let after = ctx.read(".agent-layer/state/managed-baseline.json");
    let created = |text: &str| {
        text.lines()
            .find(|line| line.contains("created_at_utc"))
            .map(str::to_string)
            .expect("baseline has created_at_utc")
    };
    assert_eq!(created(&before), created(&after));
    assert!(after.contains("\"written_by_upgrade\""));
}

#[test]
fn upgrade_from_a_prior_release_migrates_and_rewrites_managed_files() {
    let ctx = TestContext::new();
    seed_v030(&ctx);

    // Local customization the engine must preserve, plus a user memory entry.
    ctx.write(".agent-layer/config.toml", "[tools]\nallow = [\"mdbook\"]\n");
    let mut issues = String::from(common::v030::ISSUES);
    issues.push_str("- issue from repo\n");
    ctx.write("docs/agent-layer/ISSUES.md", &issues);

    let report =
        al::run(ctx.root(), None, &RunOptions::upgrade()).expect("upgrade should succeed");

    // Migration renamed the legacy slash command.
    assert!(!ctx.exists(".agent-layer/slash-commands/find-issues-legacy.md"));
    assert_eq!(
        ctx.read(".agent-layer/slash-commands/find-issues.md"),
        ctx.template(".agent-layer/slash-commands/find-issues.md")
    );
    let renamed = report
        .migration_outcomes
        .iter()
        .find(|outcome| outcome.op_id == "rename-find-issues-command")
        .expect("rename op ran");
    assert!(renamed.changed);

    // Config keys migrated, then the customized config was preserved.
    let config = ctx.read(".agent-layer/config.toml");
    assert!(config.contains("allow_extra"));
    assert!(config.contains("mdbook"));
    assert!(config.contains("schema_version = 1"));
    assert!(
        report.preserved_local.contains(&".agent-layer/config.toml".to_string()),
        "customized config must be preserved: {report:?}"
    );

    // Upstream deltas were rewritten.
    assert_eq!(
        ctx.read(".agent-layer/instructions/core.md"),
        ctx.template(".agent-layer/instructions/core.md")
    );
    assert_eq!(
        ctx.read(".agent-layer/commands.allow"),
        ctx.template(".agent-layer/commands.allow")
    );

    // Memory doc: new managed section, user entries intact.
    let issues_after = ctx.read("docs/agent-layer/ISSUES.md");
    let template_issues = ctx.template("docs/agent-layer/ISSUES.md");
    assert!(issues_after.starts_with(template_issues.trim_end_matches('\n')));
    assert!(issues_after.ends_with("- issue from repo\n"));

    // Customized config keeps the diff set non-empty, so no baseline yet.
    assert!(!report.baseline_written);
    assert_eq!(ctx.read(".agent-layer/al.version"), "0.4.0\n");
}

#[test]
fn upgrade_without_customizations_writes_an_upgrade_baseline() {
    let ctx = TestContext::new();
    seed_v030(&ctx);

    let report =
        al::run(ctx.root(), None, &RunOptions::upgrade()).expect("upgrade should succeed");
    assert!(report.baseline_written);
    let baseline = ctx.read(".agent-layer/state/managed-baseline.json");
    assert!(baseline.contains("\"written_by_upgrade\""));
    assert!(baseline.contains("\"version\": \"0.4.0\""));
}

#[test]
fn failed_run_rolls_back_and_marks_the_snapshot() {
    let sys = MemSystem::new();
    let templates =
        MemTemplates::new().with_file(".agent-layer/instructions/core.md", b"core\n");
    let root = Path::new("/repo");

    sys.fail_write_on("/repo/.agent-layer/al.version");
    let err = installer::run(&sys, &templates, root, None, &RunOptions::upgrade()).unwrap_err();
    assert!(!err.is_not_found());

    // The template written before the failure was rolled back.
    assert!(!sys.exists("/repo/.agent-layer/instructions/core.md"));

    let snapshots = al::services::snapshot::list(&sys, root).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, SnapshotStatus::AutoRolledBack);
    assert_eq!(snapshots[0].failure_step.as_deref(), Some("write_pin"));
}

#[test]
fn overwrite_mode_requires_a_prompter() {
    let sys = MemSystem::new();
    let templates =
        MemTemplates::new().with_file(".agent-layer/instructions/core.md", b"core\n");
    let options =
        RunOptions { mode: RunMode::Upgrade, overwrite: true, target_pin_version: None };

    let err = installer::run(&sys, &templates, Path::new("/repo"), None, &options).unwrap_err();
    assert!(matches!(err, AppError::PrompterRequired(_)));
}

#[test]
fn overwrite_mode_replaces_customizations_only_after_approval() {
    let root = Path::new("/repo");
    let templates =
        MemTemplates::new().with_file(".agent-layer/instructions/core.md", b"core v2\n");
    let options =
        RunOptions { mode: RunMode::Upgrade, overwrite: true, target_pin_version: None };

    // Declined: the local file survives.
    let sys = MemSystem::new();
    sys.add_file("/repo/.agent-layer/instructions/core.md", b"my notes\n");
    let prompter = ScriptedPrompter::approving().with_overwrite(false);
    let report = installer::run(&sys, &templates, root, Some(&prompter), &options).unwrap();
    assert_eq!(
        sys.file_content("/repo/.agent-layer/instructions/core.md").unwrap(),
        b"my notes\n"
    );
    assert!(report.preserved_local.contains(&".agent-layer/instructions/core.md".to_string()));

    // Approved: the template wins.
    let sys = MemSystem::new();
    sys.add_file("/repo/.agent-layer/instructions/core.md", b"my notes\n");
    let prompter = ScriptedPrompter::approving();
    let report = installer::run(&sys, &templates, root, Some(&prompter), &options).unwrap();
    assert_eq!(
        sys.file_content("/repo/.agent-layer/instructions/core.md").unwrap(),
        b"core v2\n"
    );
    assert!(report.written_templates.contains(&".agent-layer/instructions/core.md".to_string()));
    assert!(
        prompter.calls.borrow().iter().any(|call| call.starts_with("overwrite_all:")),
        "prompter must be consulted: {:?}",
        prompter.calls.borrow()
    );
}

#[test]
fn overwrite_mode_deletes_approved_unknowns() {
    let root = Path::new("/repo");
    let templates =
        MemTemplates::new().with_file(".agent-layer/instructions/core.md", b"core\n");
    let sys = MemSystem::new();
    sys.add_file("/repo/.agent-layer/slash-commands/stray.md", b"stray\n");

    let prompter = ScriptedPrompter::approving().with_delete_all(true);
    let options =
        RunOptions { mode: RunMode::Upgrade, overwrite: true, target_pin_version: None };
    let report = installer::run(&sys, &templates, root, Some(&prompter), &options).unwrap();

    assert_eq!(
        report.deleted_unknowns,
        vec![".agent-layer/slash-commands/stray.md".to_string()]
    );
    assert!(!sys.exists("/repo/.agent-layer/slash-commands/stray.md"));
}

#[test]
fn manual_rollback_restores_the_pre_run_state() {
    let ctx = TestContext::new();
    ctx.write("docs/agent-layer/ISSUES.md", "# my own issues file\n");
    // A full-file unknown under a managed root survives a plain upgrade run,
    // so mutate via init-with-overwrite approving everything.
    let report = al::run(
        ctx.root(),
        Some(&ScriptedPrompter::approving().with_delete_all(true)),
        &RunOptions { mode: RunMode::Upgrade, overwrite: true, target_pin_version: None },
    )
    .expect("overwrite run should succeed");
    assert_eq!(
        ctx.read("docs/agent-layer/ISSUES.md"),
        ctx.template("docs/agent-layer/ISSUES.md")
    );

    al::rollback_snapshot(ctx.root(), &report.snapshot_id).expect("rollback should succeed");
    assert_eq!(ctx.read("docs/agent-layer/ISSUES.md"), "# my own issues file\n");
    assert!(!ctx.exists(".agent-layer/al.version"));

    let snapshots = al::list_upgrade_snapshots(ctx.root()).unwrap();
    assert_eq!(snapshots[0].status, SnapshotStatus::ManuallyRolledBack);
}

#[test]
fn baseline_source_reflects_the_overwrite_entry_point() {
    let ctx = TestContext::new();
    let prompter = ScriptedPrompter::approving().with_delete_all(true);
    let report = al::run(
        ctx.root(),
        Some(&prompter),
        &RunOptions { mode: RunMode::Init, overwrite: true, target_pin_version: None },
    )
    .expect("overwrite init should succeed");
    assert!(report.baseline_written);

    let baseline = ctx.read(".agent-layer/state/managed-baseline.json");
    assert!(baseline.contains("\"written_by_overwrite\""));
}
