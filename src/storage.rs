//! Storage Layer
//!
//! DuckDB-backed sample storage with write/read separation:
//! - **Writer**: one actor thread owns the write connection; each write call is
//!   a single transaction
//! - **Reader**: connection pool for concurrent queries
//!
//! # Components
//!
//! - [`SeriesWriter`]: flattens labeled series into rows and writes them atomically
//! - [`SeriesReader`]: compiles label matchers and reconstructs series from rows
//! - [`StoreLayout`]: token-array or label-map table layout, chosen at build time
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod actor;
mod builder;
mod error;
mod facades;
pub mod flatten;
pub mod identifier;
mod layout;
pub mod matcher;
mod pool;
pub mod predicate;
pub mod reconstruct;
mod schema;
mod stats;
mod types;

pub use builder::{DEFAULT_TABLE, StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{SeriesReader, SeriesWriter};
pub use layout::StoreLayout;
pub use pool::MEMORY_PATH;
pub use stats::{StatsSnapshot, StorageStats};
pub use types::{
    FlatRow, Label, LabeledSeries, METRIC_NAME_LABEL, MatchExpression, MatchKind, Query,
    QueryResult, Sample, TimeSeries, encode_token,
};
