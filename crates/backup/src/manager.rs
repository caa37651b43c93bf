//! Backup manager.
//!
//! `BackupManager` owns the backup directory:
//! 1. `create_backup` writes a full dump (through the dump tool) or a
//!    data-only JSON snapshot (through the [`RowStore`]); outside production
//!    it returns [`BackupOutcome::Skipped`] without touching the disk.
//! 2. `restore_backup` is itself gated as a destructive operation.
//! 3. `list_backups` returns records newest-first.
//!
//! Files are written to `{name}.tmp` and linked into place, so an
//! interrupted backup never looks like a complete one and an existing
//! backup is never replaced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use backends::{CommandSpec, ProcessRunner, StepResult};
use chrono::{DateTime, Utc};
use db::{RowStore, TableSet};
use safety::{Backend, Config, Environment, GateVerdict, IntendedAction, Operation, Risk, SafetyGate, ToolPaths};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

use crate::models::SNAPSHOT_FORMAT_VERSION;
use crate::{BackupError, BackupKind, BackupOutcome, BackupRecord, DataSnapshot};

const PARTIAL_SUFFIX: &str = "tmp";

pub struct BackupManager {
    dir: PathBuf,
    environment: Environment,
    backend: Backend,
    database_url: String,
    tools: ToolPaths,
    tables: Option<Vec<String>>,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn RowStore>,
    gate: SafetyGate,
}

impl BackupManager {
    pub fn new(
        config: &Config,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn RowStore>,
        gate: SafetyGate,
    ) -> Self {
        Self {
            dir: config.backup_dir.clone(),
            environment: config.environment,
            backend: config.backend,
            database_url: config.database_url.clone(),
            tools: config.tools.clone(),
            tables: config.backup_tables.clone(),
            runner,
            store,
            gate,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Take a snapshot of `kind`.
    ///
    /// # Errors
    /// Naming violations, I/O, dump-tool and record-store failures, and a
    /// backup file that already exists.  Callers running a workflow
    /// downgrade these to a warning.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub async fn create_backup(&self, kind: BackupKind) -> Result<BackupOutcome, BackupError> {
        self.create_backup_at(kind, Utc::now()).await
    }

    pub(crate) async fn create_backup_at(
        &self,
        kind: BackupKind,
        timestamp: DateTime<Utc>,
    ) -> Result<BackupOutcome, BackupError> {
        self.gate.check()?;
        if !self.environment.is_production() {
            info!("not production; backup skipped");
            return Ok(BackupOutcome::Skipped {
                environment: self.environment,
                reason: format!("backups are only written in production (environment is {})", self.environment),
            });
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?;

        let record = BackupRecord::new(&self.dir, kind, timestamp);
        let exists = tokio::fs::try_exists(&record.file_path)
            .await
            .map_err(|e| BackupError::io(&record.file_path, e))?;
        if exists {
            return Err(BackupError::AlreadyExists(record.file_path));
        }

        let partial = partial_path(&record.file_path);
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BackupError::AlreadyExists(record.file_path));
            }
            Err(e) => return Err(BackupError::io(&partial, e)),
        };

        let written = match kind {
            BackupKind::Full => {
                drop(file);
                self.dump_full(&partial).await
            }
            BackupKind::DataOnly => match self.dump_data().await {
                Ok(body) => write_body(file, &body)
                    .await
                    .map_err(|e| BackupError::io(&partial, e)),
                Err(e) => Err(e),
            },
        };
        let published = match written {
            Ok(()) => publish(&partial, &record.file_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!(path = %partial.display(), "could not remove partial backup: {cleanup}");
            }
            return Err(e);
        }

        let bytes = tokio::fs::metadata(&record.file_path)
            .await
            .map(|m| m.len())
            .unwrap_or_default();
        info!(path = %record.file_path.display(), bytes, "{kind} backup written");
        Ok(BackupOutcome::Created(record))
    }

    /// Plain SQL dump written by the tool itself, so the bytes are never
    /// decoded.  Objects are dropped before they are recreated on restore.
    async fn dump_full(&self, partial: &Path) -> Result<(), BackupError> {
        let path = partial.to_string_lossy().into_owned();
        let command = CommandSpec::new(
            &self.tools.pg_dump,
            [
                "--dbname",
                self.database_url.as_str(),
                "--no-owner",
                "--no-privileges",
                "--clean",
                "--if-exists",
                "--file",
                path.as_str(),
            ],
        );
        let output = self.runner.run(&command, &[]).await?;
        if !output.success() {
            return Err(BackupError::Dump(format!(
                "`{command}` exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        let len = tokio::fs::metadata(partial)
            .await
            .map_err(|e| BackupError::io(partial, e))?
            .len();
        if len == 0 {
            return Err(BackupError::Dump(format!("`{command}` produced an empty dump")));
        }
        Ok(())
    }

    async fn dump_data(&self) -> Result<Vec<u8>, BackupError> {
        let tables = match &self.tables {
            Some(tables) => tables.clone(),
            None => self.store.list_tables().await?,
        };

        let mut set = TableSet::new();
        for table in tables {
            let rows = self.store.export_rows(&table).await?;
            set.insert(table, rows);
        }

        let snapshot = DataSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            environment: self.environment,
            backend: self.backend,
            tables: set,
        };
        info!(tables = snapshot.tables.len(), rows = snapshot.row_count(), "data snapshot taken");
        Ok(serde_json::to_vec_pretty(&snapshot)?)
    }

    // -----------------------------------------------------------------------
    // restore
    // -----------------------------------------------------------------------

    /// Replace the database contents with `record`.
    ///
    /// Always passes through the safety gate classified as at least
    /// destructive.  Never rolls anything back on failure.
    #[instrument(skip(self), fields(backup = %record.name()))]
    pub async fn restore_backup(&self, record: &BackupRecord) -> StepResult {
        let op = Operation::new(format!("restore {}", record.name()), IntendedAction::Restore, self.environment);
        match self
            .gate
            .evaluate_with_floor(&op, Risk::Destructive, "restore replaces existing rows")
        {
            Ok(GateVerdict::Proceed { .. }) => {}
            Ok(GateVerdict::Blocked { reason, .. }) => {
                return StepResult::failed(format!("restore blocked: {reason}"));
            }
            Err(e) => return StepResult::failed(e.to_string()),
        }

        let result = match record.kind {
            BackupKind::Full => self.restore_full(record).await,
            BackupKind::DataOnly => self.restore_data(record).await,
        };
        match result {
            Ok(output) => {
                info!("restore completed");
                StepResult::ok(output)
            }
            Err(e) => {
                error!("restore failed: {e}");
                StepResult::failed(e.to_string())
            }
        }
    }

    async fn restore_full(&self, record: &BackupRecord) -> Result<String, BackupError> {
        let path = record.file_path.to_string_lossy().into_owned();
        let command = CommandSpec::new(
            &self.tools.psql,
            ["--dbname", self.database_url.as_str(), "-v", "ON_ERROR_STOP=1", "--file", path.as_str()],
        );
        let output = self.runner.run(&command, &[]).await?;
        if !output.success() {
            return Err(BackupError::Dump(format!(
                "`{command}` exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(format!("restored {}", record.name()))
    }

    async fn restore_data(&self, record: &BackupRecord) -> Result<String, BackupError> {
        let bytes = tokio::fs::read(&record.file_path)
            .await
            .map_err(|e| BackupError::io(&record.file_path, e))?;
        let snapshot: DataSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(BackupError::UnsupportedVersion(snapshot.format_version));
        }

        let mut notes = Vec::new();
        if snapshot.backend != self.backend {
            let note = format!(
                "warning: snapshot was taken with the {} backend but {} is active",
                snapshot.backend, self.backend
            );
            warn!("{note}");
            notes.push(note);
        }

        let written = self.store.replace_rows(&snapshot.tables).await?;
        notes.push(format!(
            "restored {written} rows into {} tables from {}",
            snapshot.tables.len(),
            record.name()
        ));
        Ok(notes.join("\n"))
    }

    // -----------------------------------------------------------------------
    // listing
    // -----------------------------------------------------------------------

    /// Every recognised backup in the directory, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>, BackupError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?
        {
            if let Some(record) = BackupRecord::from_path(&entry.path()) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Resolve a backup by file name, or the newest one for `"latest"`.
    pub async fn find_backup(&self, name: &str) -> Result<BackupRecord, BackupError> {
        let records = self.list_backups().await?;
        let found = if name == "latest" {
            records.into_iter().next()
        } else {
            records.into_iter().find(|r| r.name() == name)
        };
        found.ok_or_else(|| BackupError::NotFound(name.to_owned()))
    }

    /// Remove `*.tmp` files left behind by interrupted backups.
    pub async fn sweep_partial_files(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&self.dir, e)),
        };

        let mut removed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PARTIAL_SUFFIX) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| BackupError::io(&path, e))?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

async fn write_body(mut file: tokio::fs::File, body: &[u8]) -> std::io::Result<()> {
    file.write_all(body).await?;
    file.sync_all().await
}

/// Move a finished partial file into place without replacing an existing backup.
async fn publish(partial: &Path, target: &Path) -> Result<(), BackupError> {
    match tokio::fs::hard_link(partial, target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(BackupError::AlreadyExists(target.to_path_buf()));
        }
        Err(e) => return Err(BackupError::io(target, e)),
    }
    if let Err(e) = tokio::fs::remove_file(partial).await {
        warn!(path = %partial.display(), "backup published but partial file remains: {e}");
    }
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
