//! promduck - Prometheus remote storage on DuckDB
//!
//! This crate stores samples received over the Prometheus remote write
//! protocol in a DuckDB table and answers remote read queries from it.
//! It can be used as a library by other Rust projects, or run as a standalone
//! server with the `promduck` executable.
//!
//! # Architecture
//!
//! - **Storage**: row flattening, label matcher translation, and series
//!   reconstruction over a token-array or label-map table
//! - **Remote**: snappy-compressed protobuf wire format
//! - **Server**: axum endpoints for `/write`, `/read` and health probes
//! - **Config**: YAML configuration with environment variable expansion
//!
//! # Example
//!
//! ```rust,no_run
//! use promduck::storage::{Label, LabeledSeries, MatchExpression, Query, Sample, StorageBuilder};
//!
//! # async fn run() -> Result<(), promduck::storage::StorageError> {
//! let handles = StorageBuilder::memory().build()?;
//!
//! let series = LabeledSeries::new(
//!     vec![Label::new("__name__", "cpu"), Label::new("host", "a")],
//!     vec![Sample::new(1_000, 0.5)],
//! );
//! handles.writer.write(&[series]).await?;
//!
//! let results = handles
//!     .reader
//!     .read(vec![Query {
//!         start_ms: 0,
//!         end_ms: 0,
//!         matchers: vec![MatchExpression::eq("__name__", "cpu")],
//!     }])
//!     .await?;
//! assert_eq!(results[0].timeseries.len(), 1);
//!
//! handles.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod remote;
pub mod server;
pub mod storage;

pub use config::{AppConfig, ConfigError};
pub use server::{AppState, create_router};
pub use storage::{SeriesReader, SeriesWriter, StorageBuilder, StorageError, StorageHandles};
