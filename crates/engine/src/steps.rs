//! Concrete migration pipeline steps.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use backends::{BackendDispatcher, StepResult};
use backup::{BackupKind, BackupManager};
use safety::{GateVerdict, IntendedAction, Operation, SafetyGate};
use tracing::{error, info};

use crate::{StepContext, WorkflowStep};

pub const GENERATE_MIGRATION: &str = "generate-migration";
pub const VERIFY_NEW_ARTIFACT: &str = "verify-new-artifact";
pub const CREATE_SAFETY_BACKUP: &str = "create-safety-backup";
pub const APPLY_MIGRATION: &str = "apply-migration";
pub const RESYNC_SECONDARY_BACKEND: &str = "resync-secondary-backend";
pub const GENERATE_CLIENT_ARTIFACTS: &str = "generate-client-artifacts";
pub const VERIFY_FINAL_STATE: &str = "verify-final-state";
pub const CLEANUP_ARTIFACTS: &str = "cleanup-artifacts";

// ---------------------------------------------------------------------------
// Backend actions
// ---------------------------------------------------------------------------

/// Which backend an [`ActionStep`] runs against, relative to the run's backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Primary,
    Secondary,
}

/// Runs one or more backend actions through the dispatcher, stopping at the
/// first failure.
pub struct ActionStep {
    name: &'static str,
    required: bool,
    actions: Vec<(IntendedAction, Target)>,
    dispatcher: Arc<BackendDispatcher>,
}

impl ActionStep {
    pub fn generate_migration(dispatcher: Arc<BackendDispatcher>) -> Self {
        Self {
            name: GENERATE_MIGRATION,
            required: true,
            actions: vec![(IntendedAction::Generate, Target::Primary)],
            dispatcher,
        }
    }

    pub fn resync_secondary(dispatcher: Arc<BackendDispatcher>) -> Self {
        Self {
            name: RESYNC_SECONDARY_BACKEND,
            required: false,
            actions: vec![(IntendedAction::Introspect, Target::Secondary)],
            dispatcher,
        }
    }

    /// Client code for both backends; a backend without a client step is a no-op.
    pub fn generate_client(dispatcher: Arc<BackendDispatcher>) -> Self {
        Self {
            name: GENERATE_CLIENT_ARTIFACTS,
            required: false,
            actions: vec![
                (IntendedAction::GenerateClient, Target::Primary),
                (IntendedAction::GenerateClient, Target::Secondary),
            ],
            dispatcher,
        }
    }

    pub fn verify_final_state(dispatcher: Arc<BackendDispatcher>) -> Self {
        Self {
            name: VERIFY_FINAL_STATE,
            required: true,
            actions: vec![(IntendedAction::Status, Target::Primary)],
            dispatcher,
        }
    }
}

#[async_trait]
impl WorkflowStep for ActionStep {
    fn name(&self) -> &str {
        self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn run(&self, ctx: &StepContext) -> StepResult {
        let mut outputs = Vec::new();
        for (action, target) in &self.actions {
            let backend = match target {
                Target::Primary => ctx.backend,
                Target::Secondary => ctx.backend.other(),
            };
            let StepResult { success, output, error } =
                self.dispatcher.execute(*action, backend, ctx.environment).await;
            outputs.extend(output);
            if !success {
                return StepResult { success, output: None, error }.with_output(outputs.join("\n"));
            }
        }
        StepResult::ok(outputs.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Apply (gated)
// ---------------------------------------------------------------------------

/// Applies pending migrations after the safety gate allows it.
///
/// Production applies with `migrate deploy`; everywhere else with `migrate dev`.
pub struct ApplyMigrationStep {
    gate: SafetyGate,
    dispatcher: Arc<BackendDispatcher>,
}

impl ApplyMigrationStep {
    pub fn new(gate: SafetyGate, dispatcher: Arc<BackendDispatcher>) -> Self {
        Self { gate, dispatcher }
    }
}

#[async_trait]
impl WorkflowStep for ApplyMigrationStep {
    fn name(&self) -> &str {
        APPLY_MIGRATION
    }

    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &StepContext) -> StepResult {
        let (phrase, action) = if ctx.environment.is_production() {
            ("migrate deploy", IntendedAction::MigrateDeploy)
        } else {
            ("migrate dev", IntendedAction::Migrate)
        };
        let op = Operation::new(phrase, action, ctx.environment);

        match self.gate.evaluate(&op) {
            Ok(GateVerdict::Proceed { .. }) => self.dispatcher.execute(action, ctx.backend, ctx.environment).await,
            Ok(GateVerdict::Blocked { reason, .. }) => StepResult::failed(format!("blocked by safety policy: {reason}")),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

/// Takes a snapshot before the apply step.  A failed backup is reported but
/// does not stop the run.
pub struct SafetyBackupStep {
    backups: Arc<BackupManager>,
    kind: BackupKind,
}

impl SafetyBackupStep {
    pub fn new(backups: Arc<BackupManager>, kind: BackupKind) -> Self {
        Self { backups, kind }
    }
}

#[async_trait]
impl WorkflowStep for SafetyBackupStep {
    fn name(&self) -> &str {
        CREATE_SAFETY_BACKUP
    }

    fn required(&self) -> bool {
        false
    }

    async fn run(&self, _ctx: &StepContext) -> StepResult {
        match self.backups.create_backup(self.kind).await {
            Ok(outcome) => StepResult::ok(outcome.to_string()),
            Err(e) => {
                error!("SAFETY BACKUP FAILED, continuing without a snapshot: {e}");
                StepResult::failed(format!("backup failed, no safety snapshot exists: {e}"))
            }
        }
    }
}

/// Removes partial backup files left by interrupted runs.
pub struct CleanupArtifactsStep {
    backups: Arc<BackupManager>,
}

impl CleanupArtifactsStep {
    pub fn new(backups: Arc<BackupManager>) -> Self {
        Self { backups }
    }
}

#[async_trait]
impl WorkflowStep for CleanupArtifactsStep {
    fn name(&self) -> &str {
        CLEANUP_ARTIFACTS
    }

    fn required(&self) -> bool {
        false
    }

    async fn run(&self, _ctx: &StepContext) -> StepResult {
        match self.backups.sweep_partial_files().await {
            Ok(removed) => StepResult::ok(format!("removed {} partial backup file(s)", removed.len())),
            Err(e) => StepResult::failed(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Migration artifacts
// ---------------------------------------------------------------------------

/// File names directly under `dir`; a missing directory is empty.
pub async fn artifact_names(dir: &Path) -> std::io::Result<BTreeSet<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e),
    };
    let mut names = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Reports which migration artifacts appeared since `baseline` was taken.
///
/// Informational: finding nothing new fails the step so it shows up as a
/// warning.
pub struct VerifyNewArtifactStep {
    dir: PathBuf,
    baseline: BTreeSet<String>,
}

impl VerifyNewArtifactStep {
    pub fn new(dir: impl Into<PathBuf>, baseline: BTreeSet<String>) -> Self {
        Self {
            dir: dir.into(),
            baseline,
        }
    }
}

#[async_trait]
impl WorkflowStep for VerifyNewArtifactStep {
    fn name(&self) -> &str {
        VERIFY_NEW_ARTIFACT
    }

    fn required(&self) -> bool {
        false
    }

    async fn run(&self, _ctx: &StepContext) -> StepResult {
        let current = match artifact_names(&self.dir).await {
            Ok(names) => names,
            Err(e) => return StepResult::failed(format!("cannot read {}: {e}", self.dir.display())),
        };
        let new: Vec<&str> = current.difference(&self.baseline).map(String::as_str).collect();
        if new.is_empty() {
            return StepResult::failed(format!("no new migration artifact in {}", self.dir.display()));
        }
        info!(artifacts = ?new, "new migration artifacts");
        StepResult::ok(format!("new migration artifacts: {}", new.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backends::mock::MockRunner;
    use safety::{Backend, Config, Environment, NonInteractive};
    use uuid::Uuid;

    fn ctx(environment: Environment, backend: Backend) -> StepContext {
        StepContext {
            run_id: Uuid::new_v4(),
            environment,
            backend,
        }
    }

    fn config(env: &str, db: &str, level: &str) -> Config {
        Config::from_vars(vec![
            ("APP_ENV", env.to_string()),
            ("DB_SAFETY_LEVEL", level.to_string()),
            ("DATABASE_URL", format!("postgres://u:p@localhost/{db}")),
        ])
        .unwrap()
    }

    fn dispatcher(cfg: &Config, runner: &MockRunner) -> Arc<BackendDispatcher> {
        Arc::new(BackendDispatcher::new(cfg, Arc::new(runner.clone())))
    }

    #[tokio::test]
    async fn resync_targets_the_other_backend() {
        let cfg = config("development", "km0_db_dev", "strict");
        let runner = MockRunner::succeeding();
        let result = ActionStep::resync_secondary(dispatcher(&cfg, &runner))
            .run(&ctx(Environment::Development, Backend::SqlMigrations))
            .await;
        assert!(result.success);
        assert_eq!(runner.command_lines(), vec!["prisma db pull"]);
    }

    #[tokio::test]
    async fn client_generation_skips_backends_without_a_client() {
        let cfg = config("development", "km0_db_dev", "strict");
        let runner = MockRunner::succeeding();
        let result = ActionStep::generate_client(dispatcher(&cfg, &runner))
            .run(&ctx(Environment::Development, Backend::SqlMigrations))
            .await;
        assert!(result.success);
        assert_eq!(runner.command_lines(), vec!["prisma generate"]);
    }

    #[tokio::test]
    async fn apply_uses_deploy_in_production() {
        let cfg = config("production", "km0_db", "strict");
        let runner = MockRunner::succeeding();
        let gate = SafetyGate::new(&cfg, Arc::new(NonInteractive));
        let result = ApplyMigrationStep::new(gate, dispatcher(&cfg, &runner))
            .run(&ctx(Environment::Production, Backend::Declarative))
            .await;
        assert!(result.success, "{result:?}");
        assert_eq!(runner.command_lines(), vec!["prisma migrate deploy"]);
    }

    #[tokio::test]
    async fn apply_is_blocked_by_paranoid_production() {
        let cfg = config("production", "km0_db", "paranoid");
        let runner = MockRunner::succeeding();
        let gate = SafetyGate::new(&cfg, Arc::new(NonInteractive));
        let result = ApplyMigrationStep::new(gate, dispatcher(&cfg, &runner))
            .run(&ctx(Environment::Production, Backend::Declarative))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("paranoid"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn apply_reports_naming_violations() {
        let cfg = config("development", "km0_db", "strict");
        let runner = MockRunner::succeeding();
        let gate = SafetyGate::new(&cfg, Arc::new(NonInteractive));
        let result = ApplyMigrationStep::new(gate, dispatcher(&cfg, &runner))
            .run(&ctx(Environment::Development, Backend::Declarative))
            .await;
        assert!(result.error.unwrap().contains("km0_db_dev"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn new_artifacts_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001_init.sql"), "").unwrap();
        let baseline = artifact_names(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("0002_add_email.sql"), "").unwrap();

        let step = VerifyNewArtifactStep::new(dir.path(), baseline);
        let result = step.run(&ctx(Environment::Development, Backend::SqlMigrations)).await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("new migration artifacts: 0002_add_email.sql"));
    }

    #[tokio::test]
    async fn unchanged_directory_fails_informationally() {
        let dir = tempfile::tempdir().unwrap();
        let step = VerifyNewArtifactStep::new(dir.path(), BTreeSet::new());
        let result = step.run(&ctx(Environment::Development, Backend::SqlMigrations)).await;
        assert!(!result.success);
        assert!(!step.required());
    }
}
