//! Backup-level error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dump tool ran but reported failure.
    #[error("dump failed: {0}")]
    Dump(String),

    #[error(transparent)]
    Process(#[from] backends::ProcessError),

    #[error("record store error: {0}")]
    Store(#[from] db::DbError),

    #[error("malformed backup file: {0}")]
    Format(#[from] serde_json::Error),

    #[error("backup file format version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("no backup named '{0}'")]
    NotFound(String),

    /// A backup with the same timestamp is already on disk.
    #[error("backup {0} already exists")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Safety(#[from] safety::SafetyError),
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
