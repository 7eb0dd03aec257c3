//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::actor::{Command, DbActor};
use crate::storage::layout::StoreLayout;
use crate::storage::matcher::MatcherTranslator;
use crate::storage::pool::{ConnectionPool, MEMORY_PATH};
use crate::storage::schema::init_schema;
use crate::storage::stats::StorageStats;
use crate::storage::types::Label;
use crate::storage::{SeriesReader, SeriesWriter};

/// Default sample table.
pub const DEFAULT_TABLE: &str = "samples";

/// Default channel capacity for writer commands (one command per write call).
const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Calculate default pool size based on available CPU parallelism.
///
/// Returns the number of available CPUs, clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(4)
}

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: String,
    layout: StoreLayout,
    table: String,
    ignore_label: Option<Label>,
    pool_size: u32,
    channel_capacity: usize,
    statement_timeout: Option<Duration>,
    init_schema: bool,
}

impl StorageBuilder {
    /// Create a new storage builder for a database file (or `:memory:`).
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-32).
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            layout: StoreLayout::default(),
            table: DEFAULT_TABLE.to_string(),
            ignore_label: None,
            pool_size: default_pool_size(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            statement_timeout: None,
            init_schema: true,
        }
    }

    /// Builder for an in-memory database.
    pub fn memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Set the table layout.
    pub fn layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the sample table identifier. Validated against the layout at build.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Label injected on the write side that must not constrain reads.
    pub fn ignore_label(mut self, label: Label) -> Self {
        self.ignore_label = Some(label);
        self
    }

    /// Set the connection pool size for readers.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Deadline applied to each read and write call.
    pub fn statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Whether to create the schema and table at build. Default: true.
    pub fn init_schema(mut self, enabled: bool) -> Self {
        self.init_schema = enabled;
        self
    }

    /// Build the storage layer and return handles.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        self.layout.validate_table(&self.table)?;

        if self.db_path != MEMORY_PATH {
            create_parent_dir(Path::new(&self.db_path))?;
        }

        let pool = ConnectionPool::open(&self.db_path, self.pool_size)?;

        // The writer gets its own connection to the same database instance,
        // so readers see every committed batch immediately.
        let writer_conn = pool.dedicated()?;
        if self.init_schema {
            init_schema(&writer_conn, self.layout, &self.table)?;
        }
        let (actor_handle, tx) = DbActor::spawn(
            writer_conn,
            self.layout,
            self.table.clone(),
            self.channel_capacity,
        );

        let stats = Arc::new(StorageStats::new()?);
        let translator = MatcherTranslator::new(
            self.layout,
            self.ignore_label.as_ref().map(Label::token),
        );

        tracing::info!(
            path = %self.db_path,
            layout = %self.layout,
            table = %self.table,
            pool_size = self.pool_size,
            "Storage initialized"
        );

        Ok(StorageHandles {
            writer: SeriesWriter::new(tx.clone(), Arc::clone(&stats), self.statement_timeout),
            reader: SeriesReader::new(
                pool,
                self.layout,
                self.table,
                translator,
                Arc::clone(&stats),
                self.statement_timeout,
            ),
            stats,
            shutdown_tx: tx,
            actor_handle: Some(actor_handle),
        })
    }
}

fn create_parent_dir(db_path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Batch writer facade.
    pub writer: SeriesWriter,
    /// Query facade.
    pub reader: SeriesReader,
    /// Counters shared by both facades.
    pub stats: Arc<StorageStats>,
    shutdown_tx: SyncSender<Command>,
    /// Internal actor handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles")
            .field("writer", &self.writer)
            .field("reader", &self.reader)
            .field("running", &self.actor_handle.is_some())
            .finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Sends shutdown command to the writer actor and waits for it to finish.
    pub fn shutdown(mut self) -> Result<(), StorageError> {
        self.shutdown_tx
            .send(Command::Shutdown)
            .map_err(|_| StorageError::ChannelClosed)?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .join()
                .map_err(|_| StorageError::Internal("Failed to join actor thread".to_string()))?;
        }

        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        // Try graceful shutdown if not already done
        if let Some(handle) = self.actor_handle.take() {
            let _ = self.shutdown_tx.send(Command::Shutdown);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{LabeledSeries, METRIC_NAME_LABEL, MatchExpression, Query, Sample};
    use tempfile::tempdir;

    fn cpu_series() -> LabeledSeries {
        LabeledSeries::new(
            vec![Label::new(METRIC_NAME_LABEL, "cpu"), Label::new("host", "a")],
            vec![Sample::new(1_000, 0.5)],
        )
    }

    #[test]
    fn test_rejects_invalid_table() {
        let err = StorageBuilder::memory()
            .table("metrics;DROP TABLE x")
            .build()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidIdentifier { .. }));

        let err = StorageBuilder::memory()
            .layout(StoreLayout::LabelMap)
            .table("samples")
            .build()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_builds() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("samples.duckdb");
        let db_path = db_path.to_str().unwrap().to_string();

        {
            let handles = StorageBuilder::new(&db_path).build().unwrap();
            assert_eq!(handles.writer.write(&[cpu_series()]).await.unwrap(), 1);
            handles.shutdown().unwrap();
        }

        let handles = StorageBuilder::new(&db_path).build().unwrap();
        let results = handles
            .reader
            .read(vec![Query {
                start_ms: 0,
                end_ms: 0,
                matchers: vec![MatchExpression::eq(METRIC_NAME_LABEL, "cpu")],
            }])
            .await
            .unwrap();
        assert_eq!(results[0].timeseries.len(), 1);
        assert_eq!(results[0].timeseries[0].samples, vec![Sample::new(1_000, 0.5)]);

        handles.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let handles = StorageBuilder::memory().build().unwrap();
        let writer = handles.writer.clone();
        handles.shutdown().unwrap();

        let err = writer.write(&[cpu_series()]).await.unwrap_err();
        assert!(matches!(err, StorageError::ChannelClosed));
    }

    #[test]
    fn test_handles_debug() {
        let handles = StorageBuilder::memory().build().unwrap();
        let debug = format!("{handles:?}");
        assert!(debug.starts_with("StorageHandles"));
        assert!(debug.contains("running: true"));
    }

    #[test]
    fn test_drop_stops_actor() {
        let handles = StorageBuilder::memory().build().unwrap();
        drop(handles);
    }

    #[test]
    fn test_default_pool_size_within_bounds() {
        let size = super::default_pool_size();
        assert!(size >= super::MIN_POOL_SIZE);
        assert!(size <= super::MAX_POOL_SIZE);
    }
}
