use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use al::adapters::ConsolePrompter;
use al::{AppError, PlanOptions, RunMode, RunOptions};

#[derive(Parser)]
#[command(name = "al")]
#[command(version)]
#[command(
    about = "Materialize, upgrade, and roll back managed .agent-layer/ workspace scaffolding",
    long_about = None
)]
struct Cli {
    /// Repository root to operate on.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the managed .agent-layer/ scaffolding
    #[clap(visible_alias = "i")]
    Init {
        /// Overwrite an existing workspace after prompting
        #[arg(long)]
        force: bool,
    },
    /// Upgrade managed files to this binary's templates
    #[clap(visible_alias = "up")]
    Upgrade {
        /// Print the plan without mutating anything
        #[arg(long)]
        dry_run: bool,
        /// Overwrite locally customized files after prompting
        #[arg(long)]
        overwrite: bool,
        /// Target pin version (defaults to this binary's release)
        #[arg(long)]
        pin: Option<String>,
    },
    /// Print the dry-run upgrade plan as JSON
    Plan {
        /// Include per-file content previews
        #[arg(long)]
        previews: bool,
        /// Target pin version (defaults to this binary's release)
        #[arg(long)]
        pin: Option<String>,
    },
    /// Report readiness findings without mutating anything
    Doctor,
    /// List upgrade snapshots, newest first
    Snapshots,
    /// Restore the repo from a snapshot
    Rollback {
        /// Snapshot id as shown by `al snapshots`
        snapshot_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => init(&cli.root, force),
        Commands::Upgrade { dry_run, overwrite, pin } => {
            upgrade(&cli.root, dry_run, overwrite, pin)
        }
        Commands::Plan { previews, pin } => plan(&cli.root, previews, pin),
        Commands::Doctor => doctor(&cli.root),
        Commands::Snapshots => snapshots(&cli.root),
        Commands::Rollback { snapshot_id } => rollback(&cli.root, &snapshot_id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn report_run(report: &al::RunReport) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    for path in &report.written_templates {
        println!("  wrote {path}");
    }
    for path in &report.preserved_local {
        println!("  preserved local {path}");
    }
    for path in &report.deleted_unknowns {
        println!("  deleted {path}");
    }
    for outcome in &report.migration_outcomes {
        match &outcome.skip_reason {
            Some(reason) => println!("  migration {}: skipped ({reason})", outcome.op_id),
            None => println!("  migration {}: applied", outcome.op_id),
        }
    }
    if report.baseline_written {
        println!("  baseline recorded for {}", report.target_version);
    }
}

fn init(root: &PathBuf, force: bool) -> Result<(), AppError> {
    let prompter = ConsolePrompter::new();
    let options = RunOptions { mode: RunMode::Init, overwrite: force, target_pin_version: None };
    let report = al::run(root, Some(&prompter), &options)?;
    report_run(&report);
    println!("Initialized .agent-layer at version {}", report.target_version);
    Ok(())
}

fn upgrade(
    root: &PathBuf,
    dry_run: bool,
    overwrite: bool,
    pin: Option<String>,
) -> Result<(), AppError> {
    if dry_run {
        return plan(root, false, pin);
    }
    let prompter = ConsolePrompter::new();
    let options =
        RunOptions { mode: RunMode::Upgrade, overwrite, target_pin_version: pin };
    let report = al::run(root, Some(&prompter), &options)?;
    report_run(&report);
    println!("Upgraded to version {}", report.target_version);
    Ok(())
}

fn plan(root: &PathBuf, previews: bool, pin: Option<String>) -> Result<(), AppError> {
    let options = PlanOptions { target_pin_version: pin };
    let plan = al::build_upgrade_plan(root, &options)?;

    if previews {
        let previews = al::build_upgrade_plan_diff_previews(root, &plan)?;
        let rendered = serde_json::to_string_pretty(&serde_json::json!({
            "plan": plan,
            "previews": previews,
        }))
        .map_err(|err| AppError::validation(format!("failed to render plan: {err}")))?;
        println!("{rendered}");
    } else {
        let rendered = serde_json::to_string_pretty(&plan)
            .map_err(|err| AppError::validation(format!("failed to render plan: {err}")))?;
        println!("{rendered}");
    }
    Ok(())
}

fn doctor(root: &PathBuf) -> Result<(), AppError> {
    let findings = al::readiness_report(root)?;
    if findings.is_empty() {
        println!("All checks passed.");
        return Ok(());
    }
    for finding in &findings {
        println!("{}: {}", finding.id, finding.summary);
        for detail in &finding.details {
            println!("  - {detail}");
        }
    }
    Ok(())
}

fn snapshots(root: &PathBuf) -> Result<(), AppError> {
    let snapshots = al::list_upgrade_snapshots(root)?;
    if snapshots.is_empty() {
        println!("(no snapshots)");
        return Ok(());
    }
    for snapshot in &snapshots {
        println!(
            "{}  {}  {:?}  {} entries",
            snapshot.snapshot_id,
            snapshot.created_at_utc,
            snapshot.status,
            snapshot.entries.len()
        );
    }
    Ok(())
}

fn rollback(root: &PathBuf, snapshot_id: &str) -> Result<(), AppError> {
    al::rollback_snapshot(root, snapshot_id)?;
    println!("Restored snapshot {snapshot_id}");
    Ok(())
}
