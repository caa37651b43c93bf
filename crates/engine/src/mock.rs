//! `MockStep` — a test double for `WorkflowStep`.

use async_trait::async_trait;
use backends::StepResult;
use std::sync::{Arc, Mutex};

use crate::{StepContext, WorkflowStep};

/// A step that returns a fixed result and records every run.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub name: String,
    pub required: bool,
    pub result: StepResult,
    /// Contexts seen by this step (in call order).
    pub calls: Arc<Mutex<Vec<StepContext>>>,
}

impl MockStep {
    pub fn succeeding(name: impl Into<String>, required: bool) -> Self {
        Self::with_result(name, required, StepResult::ok("done"))
    }

    pub fn failing(name: impl Into<String>, required: bool, error: impl Into<String>) -> Self {
        Self::with_result(name, required, StepResult::failed(error))
    }

    pub fn with_result(name: impl Into<String>, required: bool, result: StepResult) -> Self {
        Self {
            name: name.into(),
            required,
            result,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkflowStep for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn run(&self, ctx: &StepContext) -> StepResult {
        self.calls.lock().unwrap().push(*ctx);
        self.result.clone()
    }
}
