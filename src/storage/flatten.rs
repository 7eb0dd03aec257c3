//! Write-path row flattening.

use chrono::{DateTime, Utc};

use crate::storage::StorageError;
use crate::storage::types::{FlatRow, LabeledSeries, METRIC_NAME_LABEL};

/// Rows produced from one write request.
#[derive(Debug, Default)]
pub struct FlattenedBatch {
    pub rows: Vec<FlatRow>,
}

impl FlattenedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flatten every series of a write request.
///
/// Fails on the first series without a metric name or with a timestamp that
/// cannot be stored; no rows are returned then.
pub fn flatten_series(series: &[LabeledSeries]) -> Result<FlattenedBatch, StorageError> {
    let total = series.iter().map(|s| s.samples.len()).sum();
    let mut batch = FlattenedBatch {
        rows: Vec::with_capacity(total),
    };
    for (index, s) in series.iter().enumerate() {
        flatten_one(index, s, &mut batch.rows)?;
    }
    Ok(batch)
}

fn flatten_one(
    index: usize,
    series: &LabeledSeries,
    out: &mut Vec<FlatRow>,
) -> Result<(), StorageError> {
    let mut metric_name = None;
    let mut tokens = Vec::with_capacity(series.labels.len());
    for label in &series.labels {
        if label.name == METRIC_NAME_LABEL {
            metric_name = Some(label.value.as_str());
        } else {
            tokens.push(label.token());
        }
    }
    let metric_name = match metric_name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(StorageError::MissingMetricName { index }),
    };
    // Remote write sends labels name-sorted, but token order is what grouping relies on.
    tokens.sort_unstable();

    for sample in &series.samples {
        let updated_at = DateTime::<Utc>::from_timestamp_millis(sample.timestamp_ms).ok_or(
            StorageError::InvalidTimestamp {
                index,
                timestamp_ms: sample.timestamp_ms,
            },
        )?;
        out.push(FlatRow {
            updated_at,
            metric_name: metric_name.to_string(),
            labels: tokens.clone(),
            value: sample.value,
        });
    }
    Ok(())
}
