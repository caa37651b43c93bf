//! `backup` crate — safety snapshots taken before destructive operations.
//!
//! Backups are only materially written in production.  Files are never
//! deleted automatically; retention is the operator's call.

pub mod error;
pub mod models;
pub mod manager;

pub use error::BackupError;
pub use models::{BackupKind, BackupOutcome, BackupRecord, DataSnapshot};
pub use manager::BackupManager;
