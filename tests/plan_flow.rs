//! Dry-run planner scenarios against a real filesystem root.

mod common;

use al::PlanOptions;
use al::domain::ownership::{OwnershipState, reason};
use al::domain::plan::{PinAction, UpgradePlan};

use common::{TestContext, seed_v030};

fn plan_for(ctx: &TestContext) -> UpgradePlan {
    al::build_upgrade_plan(ctx.root(), &PlanOptions::default()).expect("plan should build")
}

#[test]
fn empty_repo_plans_every_template_as_addition() {
    let ctx = TestContext::new();
    let plan = plan_for(&ctx);

    assert!(plan.dry_run);
    assert!(!plan.template_additions.is_empty());
    assert!(plan.template_updates.is_empty());
    assert!(plan.template_renames.is_empty());
    assert!(plan.template_removals_or_orphans.is_empty());
    assert_eq!(plan.pin_version_change.action, PinAction::Set);

    let paths: Vec<&str> =
        plan.template_additions.iter().map(|change| change.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted, "plan output must be sorted by path");
}

#[test]
fn pristine_install_plans_nothing() {
    let ctx = TestContext::new();
    ctx.seed_current_templates();
    ctx.write(".agent-layer/al.version", "0.4.0\n");

    let plan = plan_for(&ctx);
    assert!(!plan.has_template_changes(), "unexpected changes: {plan:?}");
    assert_eq!(plan.pin_version_change.action, PinAction::None);
}

#[test]
fn user_entries_below_the_marker_do_not_make_memory_docs_eligible() {
    let ctx = TestContext::new();
    ctx.seed_current_templates();
    ctx.write(".agent-layer/al.version", "0.4.0\n");

    let mut issues = ctx.template("docs/agent-layer/ISSUES.md");
    issues.push_str("- issue from repo\n");
    ctx.write("docs/agent-layer/ISSUES.md", &issues);

    let plan = plan_for(&ctx);
    assert!(
        plan.template_updates.iter().all(|change| change.path != "docs/agent-layer/ISSUES.md")
    );
    assert!(
        plan.section_aware_updates
            .iter()
            .all(|change| change.path != "docs/agent-layer/ISSUES.md")
    );
}

#[test]
fn legacy_file_matching_a_new_template_is_planned_as_a_rename() {
    let ctx = TestContext::new();
    ctx.seed_current_templates();
    ctx.write(".agent-layer/al.version", "0.4.0\n");

    // The new-name template is absent locally; the old name holds its content.
    let content = ctx.template(".agent-layer/slash-commands/find-issues.md");
    std::fs::remove_file(
        ctx.root().join(".agent-layer/slash-commands/find-issues.md"),
    )
    .unwrap();
    ctx.write(".agent-layer/slash-commands/find-issues-legacy.md", &content);

    let plan = plan_for(&ctx);
    assert_eq!(plan.template_renames.len(), 1);
    let rename = &plan.template_renames[0];
    assert_eq!(rename.from, ".agent-layer/slash-commands/find-issues-legacy.md");
    assert_eq!(rename.to, ".agent-layer/slash-commands/find-issues.md");
    assert_eq!(rename.detection, "unique_exact_normalized_hash");

    // Both sides were claimed by the rename.
    assert!(
        plan.template_additions
            .iter()
            .all(|change| change.path != ".agent-layer/slash-commands/find-issues.md")
    );
    assert!(plan.template_removals_or_orphans.is_empty());
}

#[test]
fn customized_file_without_baseline_is_unknown() {
    let ctx = TestContext::new();
    ctx.write(".agent-layer/commands.allow", "# custom allowlist\n");

    let plan = plan_for(&ctx);
    let change = plan
        .template_updates
        .iter()
        .find(|change| change.path == ".agent-layer/commands.allow")
        .expect("commands.allow should be planned as an update");
    assert_eq!(change.ownership.ownership_state, OwnershipState::UnknownNoBaseline);
    assert!(
        change
            .ownership
            .ownership_reason_codes
            .contains(&reason::BASELINE_MISSING.to_string())
    );
}

#[test]
fn plan_from_a_prior_release_classifies_against_the_pin_manifest() {
    let ctx = TestContext::new();
    seed_v030(&ctx);

    let plan = plan_for(&ctx);

    // The renamed slash command is detected, not planned as add + orphan.
    assert_eq!(plan.template_renames.len(), 1);
    assert_eq!(plan.template_renames[0].to, ".agent-layer/slash-commands/find-issues.md");

    // review.md is new at 0.4.0.
    assert!(
        plan.template_additions
            .iter()
            .any(|change| change.path == ".agent-layer/slash-commands/review.md")
    );

    // core.md matches the 0.3.0 manifest, so it is an upstream delta.
    let core = plan
        .template_updates
        .iter()
        .find(|change| change.path == ".agent-layer/instructions/core.md")
        .expect("core.md should be an update");
    assert_eq!(core.ownership.ownership_state, OwnershipState::UpstreamTemplateDelta);

    // commands.allow gained upstream lines between 0.3.0 and 0.4.0.
    let allow = plan
        .template_updates
        .iter()
        .find(|change| change.path == ".agent-layer/commands.allow")
        .expect("commands.allow should be an update");
    assert!(
        allow
            .ownership
            .ownership_reason_codes
            .contains(&reason::ALLOWLIST_UPSTREAM_LINE_DELTA.to_string())
    );

    // Memory docs land in the section-aware list.
    let section_paths: Vec<&str> =
        plan.section_aware_updates.iter().map(|change| change.path.as_str()).collect();
    assert!(section_paths.contains(&"docs/agent-layer/ISSUES.md"));
    assert!(section_paths.contains(&"docs/agent-layer/ROADMAP.md"));

    assert_eq!(plan.pin_version_change.action, PinAction::Update);
    assert_eq!(plan.pin_version_change.current.as_deref(), Some("0.3.0"));
    assert_eq!(plan.pin_version_change.target.as_deref(), Some("0.4.0"));

    // The 0.4.0 migration manifest's config ops surface in the plan.
    assert!(
        plan.config_key_migrations.iter().any(|migration| migration.op_id == "rename-tools-allow")
    );
}

#[test]
fn unparseable_pin_with_a_target_plans_an_update() {
    let ctx = TestContext::new();
    ctx.write(".agent-layer/al.version", "not-a-version\n");

    let plan = plan_for(&ctx);
    assert_eq!(plan.pin_version_change.action, PinAction::Update);
    assert_eq!(plan.pin_version_change.current, None);
}

#[test]
fn diff_previews_cover_every_planned_change() {
    let ctx = TestContext::new();
    seed_v030(&ctx);

    let plan = plan_for(&ctx);
    let previews =
        al::build_upgrade_plan_diff_previews(ctx.root(), &plan).expect("previews should build");

    assert!(!previews.is_empty());
    let expected = plan.template_additions.len()
        + plan.template_updates.len()
        + plan.section_aware_updates.len()
        + plan.template_renames.len()
        + plan.template_removals_or_orphans.len();
    assert_eq!(previews.len(), expected);

    let core = previews
        .iter()
        .find(|preview| preview.path == ".agent-layer/instructions/core.md")
        .expect("core.md preview");
    assert!(!core.before.is_empty());
    assert_eq!(core.after, ctx.template(".agent-layer/instructions/core.md"));
    assert!(!core.added_lines.is_empty());
}
