//! Single gated operations: classify → decide → confirm → dispatch.

use std::sync::Arc;

use backends::{BackendDispatcher, StepResult};
use backup::{BackupKind, BackupManager};
use safety::{Backend, GateVerdict, IntendedAction, Operation, SafetyGate};
use serde::Serialize;
use tracing::{info, instrument};

use crate::EngineError;

/// What running one operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation: Operation,
    /// `None` for restores, which the backup manager gates itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<GateVerdict>,
    pub result: StepResult,
}

impl OperationOutcome {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

pub struct OperationRunner {
    gate: SafetyGate,
    dispatcher: Arc<BackendDispatcher>,
    backups: Arc<BackupManager>,
    backend: Backend,
}

impl OperationRunner {
    pub fn new(
        gate: SafetyGate,
        dispatcher: Arc<BackendDispatcher>,
        backups: Arc<BackupManager>,
        backend: Backend,
    ) -> Self {
        Self {
            gate,
            dispatcher,
            backups,
            backend,
        }
    }

    /// Run `op` if the gate allows it.
    ///
    /// A blocked verdict is a failed result carrying the reason, not an error.
    ///
    /// The backend always runs against the gate's environment; an operation
    /// built for another one is refused before anything is evaluated.
    ///
    /// # Errors
    /// Naming or configuration problems, an operation for another environment,
    /// and restores naming a backup that does not exist.
    #[instrument(skip(self), fields(operation = op.raw()))]
    pub async fn execute(&self, op: &Operation) -> Result<OperationOutcome, EngineError> {
        self.gate.check_target(op)?;
        let environment = self.gate.environment();

        if op.intended_action() == IntendedAction::Restore {
            let record = self.backups.find_backup(restore_target(op.raw())).await?;
            let result = self.backups.restore_backup(&record).await;
            return Ok(OperationOutcome {
                operation: op.clone(),
                verdict: None,
                result,
            });
        }

        let planned: Vec<String> = self
            .dispatcher
            .plan(op.intended_action(), self.backend)
            .map(|commands| commands.iter().map(|c| c.display_line()).collect())
            .unwrap_or_default();
        let verdict = self.gate.evaluate_planned(op, &planned)?;
        let result = match &verdict {
            GateVerdict::Blocked { reason, .. } => StepResult::failed(format!("blocked by safety policy: {reason}")),
            GateVerdict::Proceed { .. } => match op.intended_action() {
                IntendedAction::Backup => match self.backups.create_backup(BackupKind::Full).await {
                    Ok(outcome) => StepResult::ok(outcome.to_string()),
                    Err(e) => StepResult::failed(e.to_string()),
                },
                action => self.dispatcher.execute(action, self.backend, environment).await,
            },
        };

        info!(success = result.success, "operation finished");
        Ok(OperationOutcome {
            operation: op.clone(),
            verdict: Some(verdict),
            result,
        })
    }
}

/// The word after `restore`, or `latest`.
fn restore_target(raw: &str) -> &str {
    let mut words = raw.split_whitespace();
    words
        .by_ref()
        .find(|w| w.eq_ignore_ascii_case("restore"))
        .and(words.next())
        .unwrap_or("latest")
}

#[cfg(test)]
mod tests {
    use super::*;
    use backends::mock::MockRunner;
    use db::MemoryRowStore;
    use safety::{Config, Environment, NonInteractive, ScriptedConfirmer};

    fn config(env: &str, db: &str, level: &str, dir: &std::path::Path) -> Config {
        Config::from_vars(vec![
            ("APP_ENV", env.to_string()),
            ("DB_SAFETY_LEVEL", level.to_string()),
            ("DATABASE_URL", format!("postgres://u:p@localhost/{db}")),
            ("DB_BACKUP_DIR", dir.display().to_string()),
        ])
        .unwrap()
    }

    fn runner_for(cfg: &Config, gate: SafetyGate, runner: &MockRunner) -> OperationRunner {
        let process: Arc<dyn backends::ProcessRunner> = Arc::new(runner.clone());
        let dispatcher = Arc::new(BackendDispatcher::new(cfg, process.clone()));
        let backups = Arc::new(BackupManager::new(cfg, process, Arc::new(MemoryRowStore::new()), gate.clone()));
        OperationRunner::new(gate, dispatcher, backups, cfg.backend)
    }

    #[test]
    fn restore_target_defaults_to_latest() {
        assert_eq!(restore_target("restore"), "latest");
        assert_eq!(restore_target("Restore full-20261018T134605.042Z.sql"), "full-20261018T134605.042Z.sql");
    }

    #[tokio::test]
    async fn confirmed_reset_is_dispatched_in_development() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("development", "km0_db_dev", "strict", dir.path());
        let confirmer = Arc::new(ScriptedConfirmer::new(["CONFIRM"]));
        let runner = MockRunner::succeeding();
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, confirmer.clone()), &runner);

        let op = Operation::parse("migrate reset", Environment::Development).unwrap();
        let outcome = ops.execute(&op).await.unwrap();

        assert!(outcome.success());
        assert_eq!(confirmer.asked(), vec!["migrate reset"]);
        assert_eq!(runner.command_lines(), vec!["prisma migrate reset --force --skip-seed"]);
    }

    #[tokio::test]
    async fn migration_named_after_a_destructive_verb_stays_a_generate() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("development", "km0_db_dev", "strict", dir.path());
        let confirmer = Arc::new(ScriptedConfirmer::new(["CONFIRM"]));
        let runner = MockRunner::succeeding();
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, confirmer.clone()), &runner);

        let op = Operation::parse("generate --name drop_legacy_column", Environment::Development).unwrap();
        assert_eq!(op.intended_action(), IntendedAction::Generate);
        let outcome = ops.execute(&op).await.unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.verdict.unwrap().classification().risk, safety::Risk::Reset);
        assert_eq!(confirmer.asked(), vec!["generate --name drop_legacy_column"]);
        assert_eq!(runner.command_lines(), vec!["prisma migrate dev --create-only --skip-seed"]);
    }

    #[tokio::test]
    async fn operation_for_another_environment_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("development", "km0_db_dev", "disabled", dir.path());
        let runner = MockRunner::succeeding();
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, Arc::new(NonInteractive)), &runner);

        for raw in ["migrate reset", "restore"] {
            let op = Operation::parse(raw, Environment::Production).unwrap();
            let err = ops.execute(&op).await.unwrap_err();
            assert!(
                matches!(err, EngineError::Safety(safety::SafetyError::EnvironmentMismatch { .. })),
                "{raw}: {err}"
            );
        }
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn declined_reset_never_reaches_the_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("development", "km0_db_dev", "strict", dir.path());
        let runner = MockRunner::succeeding();
        let gate = SafetyGate::new(&cfg, Arc::new(ScriptedConfirmer::new(["yes"])));
        let ops = runner_for(&cfg, gate, &runner);

        let op = Operation::parse("reset", Environment::Development).unwrap();
        let outcome = ops.execute(&op).await.unwrap();

        assert!(!outcome.success());
        assert!(matches!(outcome.verdict, Some(GateVerdict::Blocked { .. })));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn naming_violation_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("development", "km0_db", "strict", dir.path());
        let runner = MockRunner::succeeding();
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, Arc::new(NonInteractive)), &runner);

        let op = Operation::parse("status", Environment::Development).unwrap();
        let err = ops.execute(&op).await.unwrap_err();
        assert!(matches!(err, EngineError::Safety(safety::SafetyError::NamingViolation { .. })));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn backup_operation_outside_production_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("test", "km0_db_test", "strict", dir.path());
        let runner = MockRunner::succeeding();
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, Arc::new(NonInteractive)), &runner);

        let op = Operation::parse("backup", Environment::Test).unwrap();
        let outcome = ops.execute(&op).await.unwrap();
        assert!(outcome.success());
        assert!(outcome.result.output.unwrap().starts_with("backup skipped"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn restore_of_unknown_backup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("production", "km0_db", "disabled", dir.path());
        let ops = runner_for(&cfg, SafetyGate::new(&cfg, Arc::new(NonInteractive)), &MockRunner::succeeding());

        let op = Operation::parse("restore", Environment::Production).unwrap();
        assert!(matches!(
            ops.execute(&op).await,
            Err(EngineError::Backup(backup::BackupError::NotFound(name))) if name == "latest"
        ));
    }
}
