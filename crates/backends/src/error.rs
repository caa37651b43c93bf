//! Errors raised while planning or running backend commands.

use safety::{Backend, IntendedAction};
use thiserror::Error;

/// Failure to run an external program at all.
///
/// A program that starts and exits non-zero is *not* an error here; its
/// status is reported through [`crate::ProcessOutput`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The program could not be started (missing binary, permissions, …).
    #[error("failed to start '{program}': {message}")]
    Spawn { program: String, message: String },

    /// The program started but its output could not be collected.
    #[error("lost output of '{program}': {message}")]
    Io { program: String, message: String },
}

/// Failure to map an abstract action onto a backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The backend has no equivalent for the action.
    #[error("{action} is not supported by the {backend} backend")]
    Unsupported {
        action: IntendedAction,
        backend: Backend,
    },
}
