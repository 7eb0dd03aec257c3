//! Connection pool using r2d2.

use std::path::Path;
use std::sync::Arc;

use duckdb::{Connection, DuckdbConnectionManager};
use r2d2::{Pool, PooledConnection};

use crate::storage::StorageError;

/// Path value selecting an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Connection pool over one DuckDB database instance.
///
/// Every connection, pooled or dedicated, is cloned from the same instance,
/// so readers see committed writes immediately (including `:memory:`).
pub struct ConnectionPool {
    pool: Pool<DuckdbConnectionManager>,
}

impl ConnectionPool {
    /// Open the database at `db_path` (or in memory) with `size` pooled connections.
    pub fn open(db_path: &str, size: u32) -> Result<Arc<Self>, StorageError> {
        let manager = if db_path == MEMORY_PATH {
            DuckdbConnectionManager::memory()?
        } else {
            DuckdbConnectionManager::file(Path::new(db_path))?
        };
        let pool = Pool::builder().max_size(size).build(manager)?;

        Ok(Arc::new(Self { pool }))
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<DuckdbConnectionManager>, StorageError> {
        Ok(self.pool.get()?)
    }

    /// Owned connection to the same instance, kept by the caller for its lifetime.
    ///
    /// Cloned from a pooled connection, which goes straight back to the pool.
    pub fn dedicated(&self) -> Result<Connection, StorageError> {
        Ok(self.pool.get()?.try_clone()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pool_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = ConnectionPool::open(db_path.to_str().unwrap(), 2).unwrap();
        let conn = pool.get().unwrap();

        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_memory_connections_share_instance() {
        let pool = ConnectionPool::open(MEMORY_PATH, 2).unwrap();

        let writer = pool.dedicated().unwrap();
        writer
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (42);")
            .unwrap();

        let reader = pool.get().unwrap();
        let x: i64 = reader
            .query_row("SELECT x FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(x, 42);
    }

    #[test]
    fn test_dedicated_connection_leaves_pool_capacity() {
        let pool = ConnectionPool::open(MEMORY_PATH, 1).unwrap();
        let _writer = pool.dedicated().unwrap();

        // The single pooled slot is free again.
        let conn = pool.get().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
