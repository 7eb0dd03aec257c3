//! User-facing storage facades.
//!
//! - `SeriesWriter`: flattens series and hands them to the writer actor as one batch
//! - `SeriesReader`: compiles queries and regroups the returned rows into series

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::Duration;

use duckdb::types::Value;
use duckdb::{Connection, InterruptHandle, Row, params_from_iter};
use tokio::sync::oneshot;

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::flatten::flatten_series;
use crate::storage::layout::StoreLayout;
use crate::storage::matcher::MatcherTranslator;
use crate::storage::pool::ConnectionPool;
use crate::storage::reconstruct::ScannedRow;
use crate::storage::stats::StorageStats;
use crate::storage::types::{Label, LabeledSeries, Query, QueryResult};

// =============================================================================
// Writer
// =============================================================================

/// Async write facade over the writer actor.
///
/// Uses `try_send`: a full queue fails the call instead of blocking the runtime.
#[derive(Clone)]
pub struct SeriesWriter {
    tx: SyncSender<Command>,
    stats: Arc<StorageStats>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for SeriesWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesWriter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SeriesWriter {
    pub(crate) fn new(
        tx: SyncSender<Command>,
        stats: Arc<StorageStats>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { tx, stats, timeout }
    }

    /// Write every sample of `series` atomically and return the row count.
    ///
    /// Dropping the returned future before it resolves rolls the batch back.
    pub async fn write(&self, series: &[LabeledSeries]) -> Result<usize, StorageError> {
        let result = self.submit(series).await;
        match &result {
            Ok(rows) => self.stats.record_write(*rows),
            Err(e) => {
                tracing::warn!(error = %e, series = series.len(), "Write failed");
                self.stats.record_write_error();
            }
        }
        result
    }

    async fn submit(&self, series: &[LabeledSeries]) -> Result<usize, StorageError> {
        let batch = flatten_series(series)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(Command::Write {
                rows: batch.rows,
                reply,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => StorageError::ChannelFull,
                TrySendError::Disconnected(_) => StorageError::ChannelClosed,
            })?;

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| StorageError::Timeout)?,
            None => rx.await,
        };
        outcome.unwrap_or(Err(StorageError::ChannelClosed))
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read facade: one pooled connection per read call.
#[derive(Clone)]
pub struct SeriesReader {
    pool: Arc<ConnectionPool>,
    layout: StoreLayout,
    table: Arc<str>,
    translator: Arc<MatcherTranslator>,
    stats: Arc<StorageStats>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for SeriesReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesReader")
            .field("layout", &self.layout)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Cancellation shared between an awaiting read and its blocking task.
///
/// While a connection is attached, cancelling interrupts the statement it is
/// running, including a scan or sort that has not produced a row yet.
#[derive(Default)]
struct ReadCancel {
    cancelled: AtomicBool,
    interrupt: Mutex<Option<Arc<InterruptHandle>>>,
}

impl ReadCancel {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let slot = self.interrupt.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            handle.interrupt();
        }
    }

    /// Route cancellation to `conn`; fails if the read was already cancelled.
    fn attach(&self, conn: &Connection) -> Result<(), StorageError> {
        *self.interrupt.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(conn.interrupt_handle());
        if self.is_cancelled() {
            self.detach();
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }

    /// Must run before the connection returns to the pool.
    fn detach(&self) {
        self.interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Cancels the read when the awaiting side goes away.
struct CancelOnDrop(Arc<ReadCancel>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl SeriesReader {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        layout: StoreLayout,
        table: impl Into<Arc<str>>,
        translator: MatcherTranslator,
        stats: Arc<StorageStats>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            layout,
            table: table.into(),
            translator: Arc::new(translator),
            stats,
            timeout,
        }
    }

    /// Run every query and return one result per query, in input order.
    ///
    /// Any failing query fails the whole call.
    pub async fn read(&self, queries: Vec<Query>) -> Result<Vec<QueryResult>, StorageError> {
        let cancel = Arc::new(ReadCancel::default());
        let _guard = CancelOnDrop(Arc::clone(&cancel));

        let reader = self.clone();
        let task = tokio::task::spawn_blocking(move || reader.run(&queries, &cancel));
        let joined = match self.timeout {
            // The abandoned task is interrupted and records its own outcome.
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| StorageError::Timeout)?,
            None => task.await,
        };

        joined.map_err(|e| {
            self.stats.record_read_error();
            StorageError::Internal(format!("read task failed: {e}"))
        })?
    }

    /// Blocking variant of [`Self::read`] for callers already off the runtime.
    pub fn read_blocking(&self, queries: &[Query]) -> Result<Vec<QueryResult>, StorageError> {
        self.run(queries, &ReadCancel::default())
    }

    /// Check that a pooled connection can run a statement.
    pub async fn ping(&self) -> Result<(), StorageError> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = pool.get()?;
            conn.execute_batch("SELECT 1;")?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Internal(format!("ping task failed: {e}")))?
    }

    fn run(&self, queries: &[Query], cancel: &ReadCancel) -> Result<Vec<QueryResult>, StorageError> {
        let result = self.pool.get().and_then(|conn| {
            cancel.attach(&conn)?;
            let results = queries
                .iter()
                .map(|query| self.run_query(&conn, query, cancel))
                .collect::<Result<Vec<_>, _>>();
            cancel.detach();
            match results {
                Err(_) if cancel.is_cancelled() => Err(StorageError::Cancelled),
                results => results,
            }
        });

        match &result {
            Ok(results) => self
                .stats
                .record_read(results.iter().map(|r| r.malformed_rows).sum()),
            Err(e) => {
                tracing::warn!(error = %e, queries = queries.len(), "Read failed");
                self.stats.record_read_error();
            }
        }
        result
    }

    fn run_query(
        &self,
        conn: &Connection,
        query: &Query,
        cancel: &ReadCancel,
    ) -> Result<QueryResult, StorageError> {
        let predicates = self.translator.compile_query(query)?;
        let sql = self.layout.select_sql(&self.table, &predicates.where_clause());
        tracing::debug!(sql = %sql, args = predicates.args().len(), "Executing read query");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(predicates.args()))?;
        let mut grouper = self.layout.grouper();
        let mut malformed_rows = 0u64;

        while let Some(row) = rows.next()? {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            match scan_row(self.layout, row)? {
                Some(scanned) => grouper.push(scanned),
                None => malformed_rows += 1,
            }
        }

        if malformed_rows > 0 {
            tracing::warn!(
                malformed_rows,
                table = %self.table,
                "Skipped rows with NULL metric name, timestamp or value"
            );
        }

        Ok(QueryResult {
            timeseries: grouper.finish(),
            malformed_rows,
        })
    }
}

// =============================================================================
// Row decoding
// =============================================================================

/// Decode one projected row, or `None` when an essential column is NULL.
fn scan_row(layout: StoreLayout, row: &Row<'_>) -> Result<Option<ScannedRow>, StorageError> {
    let metric_name: Option<String> = row.get(0)?;
    let (labels, next) = match layout {
        StoreLayout::TokenArray => {
            let tokens = text_list(row.get(1)?);
            (tokens.iter().map(|t| Label::from_token(t)).collect(), 2)
        }
        StoreLayout::LabelMap => {
            let names = text_list(row.get(1)?);
            let values = text_list(row.get(2)?);
            let labels = names
                .into_iter()
                .zip(values)
                .map(|(name, value)| Label::new(name, value))
                .collect();
            (labels, 3)
        }
    };
    let timestamp_ms: Option<i64> = row.get(next)?;
    let value: Option<f64> = row.get(next + 1)?;

    Ok(match (metric_name, timestamp_ms, value) {
        (Some(metric_name), Some(timestamp_ms), Some(value)) => Some(ScannedRow {
            metric_name,
            labels,
            timestamp_ms,
            value,
        }),
        _ => None,
    })
}

/// Strings of a list column; NULL reads as empty.
fn text_list(value: Value) -> Vec<String> {
    match value {
        Value::List(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Text(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
