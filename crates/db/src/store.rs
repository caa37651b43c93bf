//! The `RowStore` trait and its Postgres implementation.
//!
//! Rows travel as JSON objects so a data-only backup is independent of the
//! migration backend that created the schema.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use tracing::{debug, info};

use crate::{DbError, DbPool};

/// One row, keyed by column name.
pub type Row = Map<String, Value>;

/// Rows of several tables, keyed by table name.
pub type TableSet = BTreeMap<String, Vec<Row>>;

/// Read and replace whole tables.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// User tables in scope, sorted by name.  Migration bookkeeping tables
    /// (leading underscore) are excluded.
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;

    /// Every row of `table`.
    async fn export_rows(&self, table: &str) -> Result<Vec<Row>, DbError>;

    /// Atomically replace the contents of every table in `tables`.
    ///
    /// Returns the number of rows written.
    async fn replace_rows(&self, tables: &TableSet) -> Result<u64, DbError>;
}

/// Reject anything that is not a plain SQL identifier.
pub fn checked_identifier(name: &str) -> Result<&str, DbError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_owned()))
    }
}

/// [`RowStore`] over the `public` schema of a Postgres database.
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: DbPool,
}

impl PgRowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_type = 'BASE TABLE'
              AND table_name NOT LIKE '\_%'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn export_rows(&self, table: &str) -> Result<Vec<Row>, DbError> {
        let table = checked_identifier(table)?;
        let sql = format!(r#"SELECT row_to_json(t)::jsonb FROM "{table}" t"#);
        let values: Vec<Value> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                // 42P01: undefined_table
                let missing = matches!(&e, sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01"));
                if missing {
                    DbError::UnknownTable(table.to_owned())
                } else {
                    DbError::Sqlx(e)
                }
            })?;

        debug!(table, rows = values.len(), "exported");
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(row) => Ok(row),
                _ => Err(DbError::MalformedRow { table: table.to_owned() }),
            })
            .collect()
    }

    async fn replace_rows(&self, tables: &TableSet) -> Result<u64, DbError> {
        let names = tables
            .keys()
            .map(|t| checked_identifier(t).map(|t| format!(r#""{t}""#)))
            .collect::<Result<Vec<_>, _>>()?;
        if names.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("TRUNCATE {} CASCADE", names.join(", ")))
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for (table, rows) in tables {
            if rows.is_empty() {
                continue;
            }
            let sql = format!(
                r#"INSERT INTO "{table}" SELECT * FROM jsonb_populate_recordset(NULL::"{table}", $1)"#
            );
            let payload = Value::Array(rows.iter().cloned().map(Value::Object).collect());
            let result = sqlx::query(&sql).bind(Json(payload)).execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!(tables = tables.len(), rows = written, "tables replaced");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_pass() {
        for name in ["users", "user_profiles", "_prisma_migrations", "t1"] {
            assert_eq!(checked_identifier(name).unwrap(), name);
        }
    }

    #[test]
    fn injection_attempts_are_refused() {
        let too_long = "x".repeat(64);
        for name in ["", "users; DROP TABLE x", "a\"b", "1users", "public.users", too_long.as_str()] {
            assert!(matches!(checked_identifier(name), Err(DbError::InvalidIdentifier(_))), "{name}");
        }
    }
}
