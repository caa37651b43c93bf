//! Records produced by a workflow run.
//!
//! A [`WorkflowResult`] is built once by the executor and handed back by
//! value; nothing mutates it afterwards.

use backends::StepResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub required: bool,
    #[serde(flatten)]
    pub result: StepResult,
    /// Set when an optional step failed and the run continued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.result.success
    }
}

// ---------------------------------------------------------------------------
// WorkflowResult
// ---------------------------------------------------------------------------

/// Everything one run did, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    /// `false` iff a required step failed.
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    /// Name of the required step that stopped the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<String>,
}

impl WorkflowResult {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// `(step name, warning)` for every degraded optional step.
    pub fn warnings(&self) -> Vec<(&str, &str)> {
        self.steps
            .iter()
            .filter_map(|s| s.warning.as_deref().map(|w| (s.name.as_str(), w)))
            .collect()
    }

    /// The failing step's error, if the run halted.
    pub fn error(&self) -> Option<&str> {
        let halted = self.halted_at.as_deref()?;
        self.step(halted)?.result.error.as_deref()
    }
}

impl std::fmt::Display for WorkflowResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.steps {
            let mark = match (step.result.success, step.required) {
                (true, _) => "ok  ",
                (false, true) => "FAIL",
                (false, false) => "warn",
            };
            writeln!(f, "[{mark}] {}", step.name)?;
            if let Some(error) = &step.result.error {
                writeln!(f, "       {error}")?;
            }
        }
        match &self.halted_at {
            Some(step) => write!(f, "workflow {} halted at '{step}'", self.run_id),
            None if self.steps.iter().any(|s| s.warning.is_some()) => {
                write!(f, "workflow {} completed with warnings", self.run_id)
            }
            None => write!(f, "workflow {} completed", self.run_id),
        }
    }
}
