//! Core data types for the storage layer.
//!
//! - [`LabeledSeries`]: one incoming series (labels including `__name__`, samples)
//! - [`FlatRow`]: one storage row produced by the write path
//! - [`Query`] / [`MatchExpression`]: one read query and its label matchers
//! - [`TimeSeries`] / [`QueryResult`]: series reconstructed from returned rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::StorageError;

/// Reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A (name, value) label pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Encode as a `name=value` token.
    pub fn token(&self) -> String {
        encode_token(&self.name, &self.value)
    }

    /// Decode a `name=value` token. Label names never contain `=`, so the
    /// first separator splits name from value.
    pub fn from_token(token: &str) -> Self {
        match token.split_once('=') {
            Some((name, value)) => Self::new(name, value),
            None => Self::new(token, ""),
        }
    }
}

/// Encode a label as the token stored in the label collection.
pub fn encode_token(name: &str, value: &str) -> String {
    let mut token = String::with_capacity(name.len() + value.len() + 1);
    token.push_str(name);
    token.push('=');
    token.push_str(value);
    token
}

/// A single sample: epoch milliseconds and a float value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// An incoming series as delivered by remote write.
///
/// `labels` still contains the reserved `__name__` label; the row flattener
/// extracts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl LabeledSeries {
    pub fn new(labels: Vec<Label>, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }
}

/// One storage row.
///
/// `labels` holds sorted `name=value` tokens and never contains `__name__`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub updated_at: DateTime<Utc>,
    pub metric_name: String,
    pub labels: Vec<String>,
    pub value: f64,
}

/// Label matcher kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum MatchKind {
    /// Exact equality.
    Eq,
    /// Inequality.
    Neq,
    /// Full-match regex.
    Re,
    /// Negated full-match regex.
    Nre,
}

impl TryFrom<i32> for MatchKind {
    type Error = StorageError;

    /// Convert the remote-read wire value (EQ=0, NEQ=1, RE=2, NRE=3).
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Eq),
            1 => Ok(Self::Neq),
            2 => Ok(Self::Re),
            3 => Ok(Self::Nre),
            other => Err(StorageError::UnsupportedMatcherKind(other)),
        }
    }
}

/// A label matcher of a read query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpression {
    pub name: String,
    pub kind: MatchKind,
    pub value: String,
}

impl MatchExpression {
    pub fn new(name: impl Into<String>, kind: MatchKind, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, MatchKind::Eq, value)
    }
}

/// One query of a read request.
///
/// `end_ms == 0` means the range is unbounded above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub start_ms: i64,
    pub end_ms: i64,
    pub matchers: Vec<MatchExpression>,
}

/// A reconstructed series: `__name__` first, remaining labels sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Build the externally visible label set for a series.
    pub fn with_labels(metric_name: &str, mut labels: Vec<Label>) -> Self {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        let mut all = Vec::with_capacity(labels.len() + 1);
        all.push(Label::new(METRIC_NAME_LABEL, metric_name));
        all.extend(labels);
        Self {
            labels: all,
            samples: Vec::new(),
        }
    }

    /// Metric name, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == METRIC_NAME_LABEL)
            .map(|l| l.value.as_str())
    }
}

/// Result slot for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub timeseries: Vec<TimeSeries>,
    /// Rows skipped because an essential column was NULL.
    pub malformed_rows: u64,
}
