//! The `WorkflowStep` trait — the contract every pipeline step fulfils.

use async_trait::async_trait;
use backends::StepResult;
use safety::{Backend, Environment};
use uuid::Uuid;

/// Read-only context shared by every step of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepContext {
    pub run_id: Uuid,
    pub environment: Environment,
    /// Backend the migration is applied through.
    pub backend: Backend,
}

/// One unit of a workflow.
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    fn name(&self) -> &str;

    /// A failed required step halts the run; a failed optional step is
    /// recorded as a warning.
    fn required(&self) -> bool;

    /// Run the step.  Failures are reported through the result, never by
    /// panicking or returning early from the executor.
    async fn run(&self, ctx: &StepContext) -> StepResult;
}
