//! `backends` crate — the `ProcessRunner` capability and the backend dispatcher.
//!
//! Every external tool invocation goes through [`ProcessRunner`], so tests
//! substitute [`mock::MockRunner`] and never spawn real processes.

pub mod error;
pub mod result;
pub mod runner;
pub mod commands;
pub mod dispatcher;
pub mod mock;

pub use error::{DispatchError, ProcessError};
pub use result::StepResult;
pub use runner::{CommandSpec, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use commands::{commands_for, BackendCommands};
pub use dispatcher::BackendDispatcher;
