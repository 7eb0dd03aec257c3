//! Sample table bootstrap.

use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::layout::StoreLayout;

/// Create the schema and sample table for `layout` if they don't exist.
///
/// `table` must already be validated for `layout`.
pub fn init_schema(conn: &Connection, layout: StoreLayout, table: &str) -> Result<(), StorageError> {
    if let Some((namespace, _)) = table.rsplit_once('.') {
        conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {namespace};"))?;
    }
    conn.execute_batch(&layout.table_ddl(table))?;

    tracing::info!(table, layout = %layout, "Database schema initialized");
    Ok(())
}
