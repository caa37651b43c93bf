//! In-memory [`RowStore`], used by tests and dry runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::checked_identifier;
use crate::{DbError, Row, RowStore, TableSet};

#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<TableSet>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding.
    pub fn with_table(self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.lock().unwrap().insert(name.into(), rows);
        self
    }

    /// Snapshot of the current contents.
    pub fn snapshot(&self) -> TableSet {
        self.tables.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .keys()
            .filter(|t| !t.starts_with('_'))
            .cloned()
            .collect())
    }

    async fn export_rows(&self, table: &str) -> Result<Vec<Row>, DbError> {
        checked_identifier(table)?;
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::UnknownTable(table.to_owned()))
    }

    async fn replace_rows(&self, tables: &TableSet) -> Result<u64, DbError> {
        for name in tables.keys() {
            checked_identifier(name)?;
        }
        let mut current = self.tables.lock().unwrap();
        let mut written = 0u64;
        for (name, rows) in tables {
            written += rows.len() as u64;
            current.insert(name.clone(), rows.clone());
        }
        Ok(written)
    }
}
