//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("table not found: {0}")]
    UnknownTable(String),

    /// Table names are spliced into SQL, so only plain identifiers pass.
    #[error("refusing unsafe table identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("row in table '{table}' is not a JSON object")]
    MalformedRow { table: String },
}
