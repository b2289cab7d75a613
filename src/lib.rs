//! Managed-template lifecycle engine for the `.agent-layer/` workspace
//! scaffolding: materializes, upgrades, and rolls back the managed files
//! under a repository root.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
pub mod testing;

use std::path::Path;

use adapters::{EmbeddedTemplates, OsSystem};
use domain::plan::{DiffPreview, UpgradePlan};
use domain::readiness::ReadinessFinding;
use domain::snapshot::UpgradeSnapshot;

pub use domain::AppError;
pub use ports::Prompter;
pub use services::installer::{RunMode, RunOptions, RunReport};
pub use services::planner::PlanOptions;

/// Run the installer against `root` with the embedded templates.
pub fn run(
    root: &Path,
    prompter: Option<&dyn Prompter>,
    options: &RunOptions,
) -> Result<RunReport, AppError> {
    let sys = OsSystem::new();
    let templates = EmbeddedTemplates::new();
    services::installer::run(&sys, &templates, root, prompter, options)
}

/// Compute the dry-run upgrade plan for `root`.
pub fn build_upgrade_plan(root: &Path, options: &PlanOptions) -> Result<UpgradePlan, AppError> {
    let sys = OsSystem::new();
    let templates = EmbeddedTemplates::new();
    services::planner::build_upgrade_plan(&sys, &templates, root, options)
}

/// Resolve content previews for every change in a plan.
pub fn build_upgrade_plan_diff_previews(
    root: &Path,
    plan: &UpgradePlan,
) -> Result<Vec<DiffPreview>, AppError> {
    let sys = OsSystem::new();
    let templates = EmbeddedTemplates::new();
    services::planner::build_upgrade_plan_diff_previews(&sys, &templates, root, plan)
}

/// List upgrade snapshots under `root`, newest first.
pub fn list_upgrade_snapshots(root: &Path) -> Result<Vec<UpgradeSnapshot>, AppError> {
    let sys = OsSystem::new();
    services::snapshot::list(&sys, root)
}

/// Manually restore a snapshot by id.
pub fn rollback_snapshot(root: &Path, snapshot_id: &str) -> Result<(), AppError> {
    let sys = OsSystem::new();
    services::installer::rollback_snapshot(&sys, root, snapshot_id)
}

/// Standalone readiness report for `root`.
pub fn readiness_report(root: &Path) -> Result<Vec<ReadinessFinding>, AppError> {
    let sys = OsSystem::new();
    services::readiness::readiness_report(&sys, root)
}
