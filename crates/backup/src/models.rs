//! Backup records and the data-only file format.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use db::TableSet;
use safety::{Backend, Environment};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BackupKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Schema and data, produced by the dump tool.
    Full,
    /// Rows of the in-scope tables as JSON.
    DataOnly,
}

impl BackupKind {
    /// Prefix used in file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::DataOnly => "data-only",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Full => "sql",
            Self::DataOnly => "json",
        }
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full"                   => Ok(Self::Full),
            "data-only" | "data_only" => Ok(Self::DataOnly),
            other                    => Err(format!("unknown backup kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// BackupRecord
// ---------------------------------------------------------------------------

/// ISO-8601 basic format; file-name safe.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: DateTime<Utc>,
    pub file_path: PathBuf,
    pub kind: BackupKind,
}

impl BackupRecord {
    /// `{kind}-{timestamp}.{ext}`
    pub fn file_name(kind: BackupKind, timestamp: DateTime<Utc>) -> String {
        format!("{}-{}.{}", kind.as_str(), timestamp.format(TIMESTAMP_FORMAT), kind.extension())
    }

    /// The timestamp is truncated to the millisecond precision of the file name.
    pub fn new(dir: &Path, kind: BackupKind, timestamp: DateTime<Utc>) -> Self {
        let timestamp = timestamp.trunc_subsecs(3);
        Self {
            timestamp,
            file_path: dir.join(Self::file_name(kind, timestamp)),
            kind,
        }
    }

    /// Recognise a backup by its file name; anything else yields `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (kind, rest) = [BackupKind::DataOnly, BackupKind::Full]
            .into_iter()
            .find_map(|k| name.strip_prefix(k.as_str())?.strip_prefix('-').map(|rest| (k, rest)))?;
        let stamp = rest.strip_suffix(kind.extension())?.strip_suffix('.')?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?.and_utc();
        Some(Self {
            timestamp,
            file_path: path.to_path_buf(),
            kind,
        })
    }

    pub fn name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// BackupOutcome
// ---------------------------------------------------------------------------

/// Result of `create_backup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Created(BackupRecord),
    /// Nothing was written; backups only matter where data loss has real cost.
    Skipped { environment: Environment, reason: String },
}

impl BackupOutcome {
    pub fn record(&self) -> Option<&BackupRecord> {
        match self {
            Self::Created(record) => Some(record),
            Self::Skipped { .. } => None,
        }
    }
}

impl std::fmt::Display for BackupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(r) => write!(f, "{} backup written to {}", r.kind, r.file_path.display()),
            Self::Skipped { reason, .. } => write!(f, "backup skipped: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DataSnapshot
// ---------------------------------------------------------------------------

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Body of a data-only backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub environment: Environment,
    /// Backend that was active when the snapshot was taken.
    pub backend: Backend,
    pub tables: TableSet,
}

impl DataSnapshot {
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}
