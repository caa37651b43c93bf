//! `db` crate — the record store behind data-only backups.
//!
//! Provides a connection pool and the [`RowStore`] trait with a Postgres
//! implementation and an in-memory one.  No safety logic lives here; callers
//! gate every write before reaching this crate.

pub mod error;
pub mod pool;
pub mod store;
pub mod memory;

pub use pool::{create_lazy_pool, create_pool, DbPool};
pub use error::DbError;
pub use store::{PgRowStore, Row, RowStore, TableSet};
pub use memory::MemoryRowStore;
