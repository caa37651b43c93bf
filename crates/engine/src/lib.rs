//! `engine` crate — workflow steps, the halt/continue executor, and the
//! migration pipeline built from them.

pub mod models;
pub mod error;
pub mod step;
pub mod executor;
pub mod steps;
pub mod pipeline;
pub mod operation;
pub mod mock;

pub use models::{StepRecord, WorkflowResult};
pub use error::EngineError;
pub use step::{StepContext, WorkflowStep};
pub use executor::WorkflowExecutor;
pub use pipeline::{MigrationWorkflow, WorkflowOptions};
pub use operation::{OperationOutcome, OperationRunner};
