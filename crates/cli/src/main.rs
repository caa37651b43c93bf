//! `dbgate` CLI entry-point.
//!
//! Available sub-commands:
//! - `safety check`           — validate configuration and database naming.
//! - `safety execute <op>`    — gate and run one operation.
//! - `safety backup`          — take a backup (production only).
//! - `safety restore [name]`  — restore a backup (gated as destructive).
//! - `safety backups`         — list backups, newest first.
//! - `workflow run`           — run the migration pipeline.
//!
//! Exit code is 0 on success and 1 on any failure.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use backends::{BackendDispatcher, ProcessRunner, StepResult, TokioProcessRunner};
use backup::{BackupKind, BackupManager};
use clap::{Args, Parser, Subcommand};
use db::PgRowStore;
use engine::{MigrationWorkflow, OperationRunner, WorkflowOptions};
use safety::{Config, Confirmer, NonInteractive, Operation, SafetyGate, SafetyLevel, StdinConfirmer};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dbgate",
    about = "Safety gate and migration workflow for schema-changing database operations",
    version
)]
struct Cli {
    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    /// Override the configured safety level for this invocation.
    #[arg(long, global = true, value_name = "LEVEL")]
    safety_level: Option<SafetyLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Safety gate commands.
    #[command(subcommand)]
    Safety(SafetyCommand),
    /// Migration workflow commands.
    #[command(subcommand)]
    Workflow(WorkflowCommand),
}

#[derive(Subcommand)]
enum SafetyCommand {
    /// Validate configuration and database naming.
    Check,
    /// Classify, gate and run one operation, e.g. `migrate reset`.
    Execute {
        #[arg(required = true, num_args = 1..)]
        operation: Vec<String>,
        /// Show the verdict and the commands without running them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Take a backup.  Outside production nothing is written.
    Backup {
        #[arg(long, default_value = "full")]
        kind: BackupKind,
    },
    /// Restore a backup by file name.
    Restore {
        #[arg(default_value = "latest")]
        name: String,
    },
    /// List backups, newest first.
    Backups,
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// Generate, back up, apply, resync and verify.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    skip_generate: bool,
    #[arg(long)]
    skip_backup: bool,
    #[arg(long, default_value = "full")]
    backup_kind: BackupKind,
    /// List the steps without running them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct App {
    config: Config,
    gate: SafetyGate,
    dispatcher: Arc<BackendDispatcher>,
    backups: Arc<BackupManager>,
    json: bool,
}

impl App {
    fn build(json: bool, safety_level: Option<SafetyLevel>) -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!("ignoring unreadable .env file: {e}");
            }
        }
        let config = Config::from_env()?.with_safety_override(safety_level);
        info!(
            environment = %config.environment,
            level = %config.safety_level,
            backend = %config.backend,
            "configuration loaded"
        );

        let confirmer: Arc<dyn Confirmer> = if std::io::stdin().is_terminal() {
            Arc::new(StdinConfirmer)
        } else {
            Arc::new(NonInteractive)
        };
        let gate = SafetyGate::new(&config, confirmer);

        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
        let pool = db::create_lazy_pool(&config.database_url, 2).context("invalid DATABASE_URL")?;
        let store = Arc::new(PgRowStore::new(pool));

        let dispatcher = Arc::new(BackendDispatcher::new(&config, runner.clone()));
        let backups = Arc::new(BackupManager::new(&config, runner, store, gate.clone()));

        Ok(Self {
            config,
            gate,
            dispatcher,
            backups,
            json,
        })
    }

    fn print<T: Serialize + std::fmt::Display>(&self, value: &T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{value}");
        }
        Ok(())
    }

    fn print_json_or<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

fn describe(result: &StepResult) -> String {
    let mut lines = Vec::new();
    if let Some(output) = &result.output {
        lines.push(output.clone());
    }
    match &result.error {
        Some(error) => lines.push(format!("FAILED: {error}")),
        None if result.success => lines.push("OK".to_owned()),
        None => lines.push("FAILED".to_owned()),
    }
    lines.join("\n")
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let app = App::build(cli.json, cli.safety_level)?;

    match cli.command {
        Command::Safety(command) => safety_command(&app, command).await,
        Command::Workflow(WorkflowCommand::Run(args)) => workflow_run(&app, args).await,
    }
}

// ---------------------------------------------------------------------------
// safety …
// ---------------------------------------------------------------------------

async fn safety_command(app: &App, command: SafetyCommand) -> anyhow::Result<bool> {
    match command {
        SafetyCommand::Check => {
            let resolved = app.gate.check()?;
            app.print_json_or(&resolved, || {
                format!(
                    "environment {} / database '{}' / safety level {} / backend {}: OK",
                    resolved.environment, resolved.database_identifier, app.config.safety_level, app.config.backend
                )
            })?;
            Ok(true)
        }

        SafetyCommand::Execute { operation, dry_run } => {
            let op = Operation::parse(&operation.join(" "), app.config.environment)?;
            if dry_run {
                return dry_run_operation(app, &op);
            }
            let runner = OperationRunner::new(
                app.gate.clone(),
                app.dispatcher.clone(),
                app.backups.clone(),
                app.config.backend,
            );
            let outcome = runner.execute(&op).await?;
            app.print_json_or(&outcome, || describe(&outcome.result))?;
            Ok(outcome.success())
        }

        SafetyCommand::Backup { kind } => {
            let outcome = app.backups.create_backup(kind).await?;
            app.print(&outcome)?;
            Ok(true)
        }

        SafetyCommand::Restore { name } => {
            let record = app.backups.find_backup(&name).await?;
            let result = app.backups.restore_backup(&record).await;
            app.print_json_or(&result, || describe(&result))?;
            Ok(result.success)
        }

        SafetyCommand::Backups => {
            let records = app.backups.list_backups().await?;
            app.print_json_or(&records, || {
                if records.is_empty() {
                    return format!("no backups in {}", app.backups.dir().display());
                }
                records
                    .iter()
                    .map(|r| format!("{}  {:<9}  {}", r.timestamp.to_rfc3339(), r.kind, r.name()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            Ok(true)
        }
    }
}

/// Classification and decision without confirmation or side effects.
fn dry_run_operation(app: &App, op: &Operation) -> anyhow::Result<bool> {
    app.gate.check()?;
    let environment = app.config.environment;
    let classification = safety::classify(op, environment);
    let decision = safety::decide(&classification, app.config.safety_level, environment);
    let commands: Vec<String> = match app.dispatcher.plan(op.intended_action(), app.config.backend) {
        Ok(commands) => commands.iter().map(|c| c.display_line()).collect(),
        Err(e) => vec![format!("({e})")],
    };

    #[derive(Serialize)]
    struct DryRun<'a> {
        operation: &'a Operation,
        classification: &'a safety::RiskClassification,
        decision: &'a safety::PolicyDecision,
        commands: &'a [String],
    }
    let report = DryRun {
        operation: op,
        classification: &classification,
        decision: &decision,
        commands: &commands,
    };
    app.print_json_or(&report, || {
        let verdict = match (decision.allowed, decision.requires_confirmation) {
            (false, _) => format!("blocked: {}", decision.block_reason.as_deref().unwrap_or("safety policy")),
            (true, true) => "allowed after confirmation".to_owned(),
            (true, false) => "allowed".to_owned(),
        };
        let mut lines = vec![
            format!("operation:      {}", op.raw()),
            format!("classification: {} ({})", classification.risk, classification.reason),
            format!("decision:       {verdict}"),
        ];
        lines.extend(commands.iter().map(|c| format!("  would run: {c}")));
        lines.join("\n")
    })?;
    Ok(decision.allowed)
}

// ---------------------------------------------------------------------------
// workflow run
// ---------------------------------------------------------------------------

async fn workflow_run(app: &App, args: RunArgs) -> anyhow::Result<bool> {
    let options = WorkflowOptions {
        skip_generate: args.skip_generate,
        skip_backup: args.skip_backup,
        backup_kind: args.backup_kind,
    };
    let workflow = MigrationWorkflow::new(
        app.config.clone(),
        app.gate.clone(),
        app.dispatcher.clone(),
        app.backups.clone(),
    )
    .with_options(options);

    if args.dry_run {
        app.gate.check()?;
        let steps = workflow.steps().await?;
        let listed: Vec<(&str, bool)> = steps.iter().map(|s| (s.name(), s.required())).collect();
        app.print_json_or(&listed, || {
            listed
                .iter()
                .map(|(name, required)| format!("{name}{}", if *required { "" } else { " (optional)" }))
                .collect::<Vec<_>>()
                .join("\n")
        })?;
        return Ok(true);
    }

    let result = workflow.run().await?;
    app.print(&result)?;
    Ok(result.success)
}
