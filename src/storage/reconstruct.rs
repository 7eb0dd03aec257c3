//! Read-path series reconstruction.
//!
//! Regroups flat rows into series. Which strategy applies depends on the
//! ordering the read query guarantees:
//!
//! - **Streaming merge**: rows of one series arrive contiguously, so a new
//!   series starts whenever the (metric name, labels) key changes.
//! - **Hash grouping**: rows arrive in time order only and are collected per
//!   key; output order between series is unspecified.

use std::collections::HashMap;

use crate::storage::types::{Label, Sample, TimeSeries};

/// One row returned by the read query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRow {
    pub metric_name: String,
    /// Sorted by token for the token-array layout, storage order otherwise.
    pub labels: Vec<Label>,
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Grouping state for one query's row stream.
#[derive(Debug)]
pub enum SeriesGrouper {
    Streaming(StreamingMerge),
    Hashed(HashGrouping),
}

impl SeriesGrouper {
    pub fn streaming() -> Self {
        Self::Streaming(StreamingMerge::default())
    }

    pub fn hashed() -> Self {
        Self::Hashed(HashGrouping::default())
    }

    pub fn push(&mut self, row: ScannedRow) {
        match self {
            Self::Streaming(g) => g.push(row),
            Self::Hashed(g) => g.push(row),
        }
    }

    pub fn finish(self) -> Vec<TimeSeries> {
        match self {
            Self::Streaming(g) => g.finish(),
            Self::Hashed(g) => g.finish(),
        }
    }
}

/// Contiguous-key grouping for rows ordered by (name, labels, time).
#[derive(Debug, Default)]
pub struct StreamingMerge {
    current: Option<(String, Vec<Label>)>,
    series: Vec<TimeSeries>,
}

impl StreamingMerge {
    pub fn push(&mut self, row: ScannedRow) {
        let sample = Sample::new(row.timestamp_ms, row.value);
        let same_key = matches!(
            &self.current,
            Some((name, labels)) if *name == row.metric_name && *labels == row.labels
        );
        if !same_key {
            let mut ts = TimeSeries::with_labels(&row.metric_name, row.labels.clone());
            ts.samples.push(sample);
            self.series.push(ts);
            self.current = Some((row.metric_name, row.labels));
            return;
        }
        if let Some(ts) = self.series.last_mut() {
            ts.samples.push(sample);
        }
    }

    pub fn finish(self) -> Vec<TimeSeries> {
        self.series
    }
}

/// Key-to-series grouping for rows ordered by time only.
#[derive(Debug, Default)]
pub struct HashGrouping {
    series: HashMap<String, TimeSeries>,
}

impl HashGrouping {
    pub fn push(&mut self, row: ScannedRow) {
        let key = series_key(&row.metric_name, &row.labels);
        let sample = Sample::new(row.timestamp_ms, row.value);
        self.series
            .entry(key)
            .or_insert_with(|| TimeSeries::with_labels(&row.metric_name, row.labels))
            .samples
            .push(sample);
    }

    pub fn finish(self) -> Vec<TimeSeries> {
        self.series.into_values().collect()
    }
}

/// Metric name followed by the sorted tokens, joined with U+001F.
fn series_key(metric_name: &str, labels: &[Label]) -> String {
    let mut tokens: Vec<String> = labels.iter().map(Label::token).collect();
    tokens.sort_unstable();
    let mut key = String::with_capacity(
        metric_name.len() + tokens.iter().map(|t| t.len() + 1).sum::<usize>(),
    );
    key.push_str(metric_name);
    for token in &tokens {
        key.push('\u{1f}');
        key.push_str(token);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, labels: &[(&str, &str)], ts: i64, value: f64) -> ScannedRow {
        ScannedRow {
            metric_name: name.to_string(),
            labels: labels.iter().map(|(n, v)| Label::new(*n, *v)).collect(),
            timestamp_ms: ts,
            value,
        }
    }

    fn label_names(ts: &TimeSeries) -> Vec<&str> {
        ts.labels.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn test_streaming_groups_contiguous_rows() {
        let mut g = SeriesGrouper::streaming();
        g.push(row("cpu", &[("host", "a")], 1_000, 0.5));
        g.push(row("cpu", &[("host", "a")], 2_000, 0.7));
        g.push(row("cpu", &[("host", "b")], 1_000, 0.1));
        g.push(row("mem", &[("host", "b")], 1_000, 9.0));

        let series = g.finish();
        assert_eq!(series.len(), 3);
        assert_eq!(
            series[0].labels,
            vec![Label::new("__name__", "cpu"), Label::new("host", "a")]
        );
        assert_eq!(
            series[0].samples,
            vec![Sample::new(1_000, 0.5), Sample::new(2_000, 0.7)]
        );
        assert_eq!(series[1].labels[1], Label::new("host", "b"));
        assert_eq!(series[2].metric_name(), Some("mem"));
    }

    #[test]
    fn test_streaming_never_merges_non_adjacent_runs() {
        let mut g = StreamingMerge::default();
        g.push(row("cpu", &[("host", "a")], 1_000, 1.0));
        g.push(row("cpu", &[("host", "b")], 1_000, 2.0));
        g.push(row("cpu", &[("host", "a")], 2_000, 3.0));

        let series = g.finish();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].samples, vec![Sample::new(1_000, 1.0)]);
        assert_eq!(series[2].samples, vec![Sample::new(2_000, 3.0)]);
        assert_eq!(series[0].labels, series[2].labels);
    }

    #[test]
    fn test_streaming_compares_every_label() {
        let mut g = StreamingMerge::default();
        g.push(row("cpu", &[("a", "1"), ("b", "1")], 1, 1.0));
        g.push(row("cpu", &[("a", "1"), ("b", "2")], 2, 2.0));
        g.push(row("cpu", &[("a", "1")], 3, 3.0));
        assert_eq!(g.finish().len(), 3);
    }

    #[test]
    fn test_streaming_sorts_visible_labels_by_name() {
        let mut g = StreamingMerge::default();
        // Token order puts "a0=..." before "a=..."; names must come out a, a0.
        g.push(row("cpu", &[("a0", "x"), ("a", "y")], 1, 1.0));
        let series = g.finish();
        assert_eq!(label_names(&series[0]), vec!["__name__", "a", "a0"]);
    }

    #[test]
    fn test_hash_grouping_merges_interleaved_rows() {
        let mut g = SeriesGrouper::hashed();
        g.push(row("cpu", &[("host", "a")], 1_000, 1.0));
        g.push(row("cpu", &[("host", "b")], 1_000, 2.0));
        g.push(row("cpu", &[("host", "a")], 2_000, 3.0));
        g.push(row("cpu", &[("host", "b")], 2_000, 4.0));

        let mut series = g.finish();
        series.sort_by(|a, b| a.labels.cmp(&b.labels));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].labels[1], Label::new("host", "a"));
        assert_eq!(
            series[0].samples,
            vec![Sample::new(1_000, 1.0), Sample::new(2_000, 3.0)]
        );
        assert_eq!(
            series[1].samples,
            vec![Sample::new(1_000, 2.0), Sample::new(2_000, 4.0)]
        );
    }

    #[test]
    fn test_hash_grouping_ignores_storage_label_order() {
        let mut g = HashGrouping::default();
        g.push(row("cpu", &[("zone", "z"), ("host", "a")], 1, 1.0));
        g.push(row("cpu", &[("host", "a"), ("zone", "z")], 2, 2.0));

        let series = g.finish();
        assert_eq!(series.len(), 1);
        assert_eq!(label_names(&series[0]), vec!["__name__", "host", "zone"]);
        assert_eq!(series[0].samples.len(), 2);
    }

    #[test]
    fn test_hash_grouping_separates_metric_names() {
        let mut g = HashGrouping::default();
        g.push(row("cpu", &[], 1, 1.0));
        g.push(row("mem", &[], 1, 1.0));
        assert_eq!(g.finish().len(), 2);
    }

    #[test]
    fn test_empty_stream() {
        assert!(SeriesGrouper::streaming().finish().is_empty());
        assert!(SeriesGrouper::hashed().finish().is_empty());
    }
}
