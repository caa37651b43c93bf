//! Workflow execution engine.
//!
//! `WorkflowExecutor` runs an ordered list of steps:
//! 1. Steps execute one at a time, in order; nothing runs concurrently.
//! 2. A failed required step halts the run immediately.  No later step runs
//!    and nothing is rolled back.
//! 3. A failed optional step is logged as a warning and the run continues.
//! 4. Nothing is retried; migration tools are not safe to re-run blindly.

use chrono::Utc;
use safety::{Backend, Environment};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{StepContext, StepRecord, WorkflowResult, WorkflowStep};

/// Stateless orchestrator for a single run.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowExecutor {
    environment: Environment,
    backend: Backend,
}

impl WorkflowExecutor {
    pub fn new(environment: Environment, backend: Backend) -> Self {
        Self { environment, backend }
    }

    /// Run `steps` and return the immutable record of the run.
    #[instrument(skip_all, fields(environment = %self.environment, backend = %self.backend, steps = steps.len()))]
    pub async fn run(&self, steps: &[Box<dyn WorkflowStep>]) -> WorkflowResult {
        let ctx = StepContext {
            run_id: Uuid::new_v4(),
            environment: self.environment,
            backend: self.backend,
        };
        let started_at = Utc::now();
        info!(run_id = %ctx.run_id, "workflow started");

        let mut records = Vec::with_capacity(steps.len());
        let mut halted_at = None;

        for (index, step) in steps.iter().enumerate() {
            let name = step.name().to_owned();
            let required = step.required();
            info!(step = %name, position = index + 1, total = steps.len(), required, "running step");

            let step_started = Utc::now();
            let result = step.run(&ctx).await;
            let step_finished = Utc::now();

            let warning = if result.success {
                info!(step = %name, "step succeeded");
                None
            } else if required {
                error!(step = %name, error = ?result.error, "required step failed; halting");
                None
            } else {
                let warning = format!(
                    "optional step '{name}' failed: {}",
                    result.error.as_deref().unwrap_or("no error reported")
                );
                warn!("{warning}");
                Some(warning)
            };

            let halt = !result.success && required;
            records.push(StepRecord {
                name: name.clone(),
                required,
                result,
                warning,
                started_at: step_started,
                finished_at: step_finished,
            });

            if halt {
                halted_at = Some(name);
                break;
            }
        }

        let result = WorkflowResult {
            run_id: ctx.run_id,
            success: halted_at.is_none(),
            started_at,
            finished_at: Utc::now(),
            steps: records,
            halted_at,
        };
        if result.success {
            info!(run_id = %result.run_id, warnings = result.warnings().len(), "workflow completed");
        } else {
            error!(run_id = %result.run_id, "workflow halted");
        }
        result
    }
}
