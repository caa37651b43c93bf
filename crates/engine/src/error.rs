//! Engine-level error types.

use thiserror::Error;

/// Hard failures that stop a run before any step executes.
///
/// Step failures are not errors; they are recorded in the
/// [`crate::WorkflowResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration or naming problem detected before the first step.
    #[error(transparent)]
    Safety(#[from] safety::SafetyError),

    /// The migrations directory could not be inspected.
    #[error("cannot read migrations directory {path}: {source}")]
    MigrationsDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Backup(#[from] backup::BackupError),
}
