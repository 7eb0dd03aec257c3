//! Writer actor with dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one thread owns the write connection and processes
//! commands via MPSC. Each write command is one transaction: every row is
//! inserted or none is.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use duckdb::{Connection, params_from_iter};
use tokio::sync::oneshot;

use crate::storage::StorageError;
use crate::storage::layout::StoreLayout;
use crate::storage::types::FlatRow;

/// Reply channel for a write command.
pub type WriteReply = oneshot::Sender<Result<usize, StorageError>>;

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Insert all rows in one transaction and reply with the row count.
    Write { rows: Vec<FlatRow>, reply: WriteReply },
    /// Graceful shutdown.
    Shutdown,
}

/// Database writer actor.
pub struct DbActor {
    conn: Connection,
    rx: Receiver<Command>,
    layout: StoreLayout,
    table: String,
}

impl DbActor {
    /// Spawn the writer actor thread on `conn`.
    ///
    /// `table` must already be validated for `layout`.
    pub fn spawn(
        conn: Connection,
        layout: StoreLayout,
        table: impl Into<String>,
        channel_capacity: usize,
    ) -> (JoinHandle<()>, SyncSender<Command>) {
        let (tx, rx) = mpsc::sync_channel(channel_capacity);
        let mut actor = DbActor {
            conn,
            rx,
            layout,
            table: table.into(),
        };
        let handle = thread::spawn(move || actor.run());

        (handle, tx)
    }

    fn run(&mut self) {
        tracing::info!(table = %self.table, layout = %self.layout, "DbActor started");

        loop {
            match self.rx.recv() {
                Ok(cmd) => {
                    if self.handle_command(cmd) {
                        break; // Shutdown requested
                    }
                }
                Err(_) => {
                    tracing::warn!("Channel disconnected, shutting down");
                    break;
                }
            }
        }

        tracing::info!("DbActor stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Write { rows, reply } => {
                let result = self.write_batch(&rows, &reply);
                if let Err(e) = &result {
                    tracing::error!(error = %e, count = rows.len(), "Write batch rolled back");
                }
                // Receiver gone means the caller was cancelled; nothing to report.
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                if let Err(e) = self.checkpoint() {
                    tracing::warn!(error = %e, "Final checkpoint failed");
                }
                return true;
            }
        }
        false
    }

    /// Insert `rows` in one transaction.
    ///
    /// Any failed row drops the transaction, which rolls it back. A caller
    /// already gone before commit gets a rollback instead.
    ///
    /// The check is not atomic with the commit: a caller whose timeout fires
    /// between `is_closed` and `commit` reports `Timeout` for a batch that did
    /// commit. If the sender retries, that batch is stored twice.
    fn write_batch(&mut self, rows: &[FlatRow], reply: &WriteReply) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        for row in rows {
            let sql = self.layout.insert_sql(&self.table, row.labels.len());
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(self.layout.insert_args(row)))?;
        }

        if reply.is_closed() {
            tx.rollback()?;
            return Err(StorageError::Cancelled);
        }
        tx.commit()?;

        tracing::debug!(count = rows.len(), "Write batch committed");
        Ok(rows.len())
    }

    fn checkpoint(&self) -> Result<(), StorageError> {
        self.conn.execute_batch("CHECKPOINT;")?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}
