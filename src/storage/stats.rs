//! Request and row counters.
//!
//! Counters live in a private Prometheus registry: `/metrics` renders it in
//! text exposition format, `/healthz` reports a [`StatsSnapshot`] of it.

use prometheus::{IntCounter, Opts, Registry};
use serde::Serialize;

use crate::storage::StorageError;

/// Fire-and-forget counters shared by the storage facades.
pub struct StorageStats {
    registry: Registry,
    write_requests: IntCounter,
    samples_written: IntCounter,
    write_errors: IntCounter,
    read_requests: IntCounter,
    read_errors: IntCounter,
    malformed_rows: IntCounter,
}

/// Point-in-time copy of [`StorageStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub write_requests: u64,
    pub rows_written: u64,
    pub write_errors: u64,
    pub read_requests: u64,
    pub read_errors: u64,
    pub malformed_rows: u64,
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, StorageError> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl StorageStats {
    /// Create the counters in a fresh registry.
    pub fn new() -> Result<Self, StorageError> {
        let registry = Registry::new();
        Ok(Self {
            write_requests: register_counter(
                &registry,
                "write_requests_total",
                "Number of remote write calls",
            )?,
            samples_written: register_counter(
                &registry,
                "samples_written_total",
                "Number of samples committed to the store",
            )?,
            write_errors: register_counter(
                &registry,
                "write_errors_total",
                "Number of remote write calls that failed",
            )?,
            read_requests: register_counter(
                &registry,
                "read_requests_total",
                "Number of remote read calls",
            )?,
            read_errors: register_counter(
                &registry,
                "read_errors_total",
                "Number of remote read calls that failed",
            )?,
            malformed_rows: register_counter(
                &registry,
                "malformed_rows_total",
                "Rows skipped on read for a NULL metric name, timestamp or value",
            )?,
            registry,
        })
    }

    /// Registry holding every counter, for exposition.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_write(&self, rows: usize) {
        self.write_requests.inc();
        self.samples_written.inc_by(rows as u64);
    }

    pub fn record_write_error(&self) {
        self.write_requests.inc();
        self.write_errors.inc();
    }

    pub fn record_read(&self, malformed_rows: u64) {
        self.read_requests.inc();
        self.malformed_rows.inc_by(malformed_rows);
    }

    pub fn record_read_error(&self) {
        self.read_requests.inc();
        self.read_errors.inc();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            write_requests: self.write_requests.get(),
            rows_written: self.samples_written.get(),
            write_errors: self.write_errors.get(),
            read_requests: self.read_requests.get(),
            read_errors: self.read_errors.get(),
            malformed_rows: self.malformed_rows.get(),
        }
    }
}

impl std::fmt::Debug for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageStats")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_counters() {
        let stats = StorageStats::new().unwrap();
        stats.record_write(3);
        stats.record_write_error();
        stats.record_read(2);
        stats.record_read_error();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                write_requests: 2,
                rows_written: 3,
                write_errors: 1,
                read_requests: 2,
                read_errors: 1,
                malformed_rows: 2,
            }
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(StorageStats::new().unwrap().snapshot()).unwrap();
        assert_eq!(json["rows_written"], 0);
    }

    #[test]
    fn test_registry_exposes_counters() {
        let stats = StorageStats::new().unwrap();
        stats.record_write(5);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&stats.registry().gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("samples_written_total 5"));
        assert!(text.contains("write_requests_total 1"));
        assert!(text.contains("# TYPE malformed_rows_total counter"));
    }

    #[test]
    fn test_instances_do_not_share_counters() {
        let a = StorageStats::new().unwrap();
        let b = StorageStats::new().unwrap();
        a.record_write(1);
        assert_eq!(b.snapshot().write_requests, 0);
    }
}
