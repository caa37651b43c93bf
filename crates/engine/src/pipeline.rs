//! The migration workflow.
//!
//! `MigrationWorkflow` builds the standard step list and hands it to the
//! [`WorkflowExecutor`]:
//!
//! ```text
//! generate-migration        required
//! verify-new-artifact       optional, informational
//! create-safety-backup      optional, failure is loud
//! apply-migration           required, gated
//! resync-secondary-backend  optional
//! generate-client-artifacts optional
//! verify-final-state        required
//! cleanup-artifacts         optional
//! ```

use std::sync::Arc;

use backends::BackendDispatcher;
use backup::{BackupKind, BackupManager};
use safety::{Config, SafetyGate};
use serde::Serialize;
use tracing::{info, instrument};

use crate::steps::{
    artifact_names, ActionStep, ApplyMigrationStep, CleanupArtifactsStep, SafetyBackupStep,
    VerifyNewArtifactStep,
};
use crate::{EngineError, WorkflowExecutor, WorkflowResult, WorkflowStep};

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowOptions {
    /// Omit generate-migration and verify-new-artifact; apply what is already on disk.
    pub skip_generate: bool,
    pub skip_backup: bool,
    pub backup_kind: BackupKind,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            skip_generate: false,
            skip_backup: false,
            backup_kind: BackupKind::Full,
        }
    }
}

pub struct MigrationWorkflow {
    config: Config,
    gate: SafetyGate,
    dispatcher: Arc<BackendDispatcher>,
    backups: Arc<BackupManager>,
    options: WorkflowOptions,
}

impl MigrationWorkflow {
    pub fn new(
        config: Config,
        gate: SafetyGate,
        dispatcher: Arc<BackendDispatcher>,
        backups: Arc<BackupManager>,
    ) -> Self {
        Self {
            config,
            gate,
            dispatcher,
            backups,
            options: WorkflowOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// The steps a run would execute, in order.
    ///
    /// Snapshots the migrations directory so the verify step can tell which
    /// artifacts the generate step produced.
    pub async fn steps(&self) -> Result<Vec<Box<dyn WorkflowStep>>, EngineError> {
        let mut steps: Vec<Box<dyn WorkflowStep>> = Vec::new();

        if !self.options.skip_generate {
            let dir = &self.config.migrations_dir;
            let baseline = artifact_names(dir).await.map_err(|source| EngineError::MigrationsDir {
                path: dir.clone(),
                source,
            })?;
            steps.push(Box::new(ActionStep::generate_migration(self.dispatcher.clone())));
            steps.push(Box::new(VerifyNewArtifactStep::new(dir, baseline)));
        }
        if !self.options.skip_backup {
            steps.push(Box::new(SafetyBackupStep::new(self.backups.clone(), self.options.backup_kind)));
        }
        steps.push(Box::new(ApplyMigrationStep::new(self.gate.clone(), self.dispatcher.clone())));
        steps.push(Box::new(ActionStep::resync_secondary(self.dispatcher.clone())));
        steps.push(Box::new(ActionStep::generate_client(self.dispatcher.clone())));
        steps.push(Box::new(ActionStep::verify_final_state(self.dispatcher.clone())));
        steps.push(Box::new(CleanupArtifactsStep::new(self.backups.clone())));
        Ok(steps)
    }

    /// Validate the environment, then run every step.
    ///
    /// # Errors
    /// Configuration and naming problems, before any step has run.  Step
    /// failures are reported in the returned [`WorkflowResult`].
    #[instrument(skip(self), fields(environment = %self.config.environment, backend = %self.config.backend))]
    pub async fn run(&self) -> Result<WorkflowResult, EngineError> {
        let resolved = self.gate.check()?;
        info!(database = %resolved.database_identifier, "environment validated");

        let steps = self.steps().await?;
        let executor = WorkflowExecutor::new(self.config.environment, self.config.backend);
        Ok(executor.run(&steps).await)
    }
}
