//! Snappy-compressed protobuf bodies and their conversion to storage types.
//!
//! Remote write and remote read both use the snappy *block* format, not the
//! framed stream format.

use prost::Message;
use thiserror::Error;

use crate::remote::proto;
use crate::storage::{
    Label, LabeledSeries, MatchExpression, MatchKind, Query, QueryResult, Sample, StorageError,
    TimeSeries,
};

/// Errors decoding a request body.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error(transparent)]
    Matcher(#[from] StorageError),
}

fn decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(snap::raw::Decoder::new().decompress_vec(body)?)
}

fn compress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(snap::raw::Encoder::new().compress_vec(payload)?)
}

// ===== Remote write =====

/// Decode a remote write body into labeled series.
pub fn decode_write_request(body: &[u8]) -> Result<Vec<LabeledSeries>, CodecError> {
    let request = proto::WriteRequest::decode(decompress(body)?.as_slice())?;
    Ok(request.timeseries.into_iter().map(LabeledSeries::from).collect())
}

/// Encode labeled series as a remote write body.
pub fn encode_write_request(series: &[LabeledSeries]) -> Result<Vec<u8>, CodecError> {
    let request = proto::WriteRequest {
        timeseries: series
            .iter()
            .map(|s| proto::TimeSeries {
                labels: s.labels.iter().cloned().map(proto::Label::from).collect(),
                samples: s.samples.iter().copied().map(proto::Sample::from).collect(),
            })
            .collect(),
    };
    compress(&request.encode_to_vec())
}

// ===== Remote read =====

/// Decode a remote read body into queries.
///
/// Fails on the first matcher whose type is not EQ/NEQ/RE/NRE.
pub fn decode_read_request(body: &[u8]) -> Result<Vec<Query>, CodecError> {
    let request = proto::ReadRequest::decode(decompress(body)?.as_slice())?;
    request
        .queries
        .into_iter()
        .map(|q| Query::try_from(q).map_err(CodecError::from))
        .collect()
}

/// Encode queries as a remote read body.
pub fn encode_read_request(queries: &[Query]) -> Result<Vec<u8>, CodecError> {
    let request = proto::ReadRequest {
        queries: queries.iter().map(proto::Query::from).collect(),
        accepted_response_types: vec![proto::ResponseType::Samples as i32],
    };
    compress(&request.encode_to_vec())
}

/// Encode per-query results as a remote read response body.
pub fn encode_read_response(results: Vec<QueryResult>) -> Result<Vec<u8>, CodecError> {
    let response = proto::ReadResponse {
        results: results
            .into_iter()
            .map(|r| proto::QueryResult {
                timeseries: r.timeseries.into_iter().map(proto::TimeSeries::from).collect(),
            })
            .collect(),
    };
    compress(&response.encode_to_vec())
}

/// Decode a remote read response body into one series list per query.
pub fn decode_read_response(body: &[u8]) -> Result<Vec<Vec<TimeSeries>>, CodecError> {
    let response = proto::ReadResponse::decode(decompress(body)?.as_slice())?;
    Ok(response
        .results
        .into_iter()
        .map(|r| r.timeseries.into_iter().map(TimeSeries::from).collect())
        .collect())
}

// ===== Conversions =====

impl From<proto::Label> for Label {
    fn from(l: proto::Label) -> Self {
        Label::new(l.name, l.value)
    }
}

impl From<Label> for proto::Label {
    fn from(l: Label) -> Self {
        proto::Label {
            name: l.name,
            value: l.value,
        }
    }
}

impl From<proto::Sample> for Sample {
    fn from(s: proto::Sample) -> Self {
        Sample::new(s.timestamp, s.value)
    }
}

impl From<Sample> for proto::Sample {
    fn from(s: Sample) -> Self {
        proto::Sample {
            value: s.value,
            timestamp: s.timestamp_ms,
        }
    }
}

impl From<proto::TimeSeries> for LabeledSeries {
    fn from(ts: proto::TimeSeries) -> Self {
        LabeledSeries::new(
            ts.labels.into_iter().map(Label::from).collect(),
            ts.samples.into_iter().map(Sample::from).collect(),
        )
    }
}

impl From<TimeSeries> for proto::TimeSeries {
    fn from(ts: TimeSeries) -> Self {
        proto::TimeSeries {
            labels: ts.labels.into_iter().map(proto::Label::from).collect(),
            samples: ts.samples.into_iter().map(proto::Sample::from).collect(),
        }
    }
}

impl From<proto::TimeSeries> for TimeSeries {
    fn from(ts: proto::TimeSeries) -> Self {
        TimeSeries {
            labels: ts.labels.into_iter().map(Label::from).collect(),
            samples: ts.samples.into_iter().map(Sample::from).collect(),
        }
    }
}

impl TryFrom<proto::LabelMatcher> for MatchExpression {
    type Error = StorageError;

    fn try_from(m: proto::LabelMatcher) -> Result<Self, Self::Error> {
        Ok(MatchExpression::new(m.name, MatchKind::try_from(m.r#type)?, m.value))
    }
}

impl TryFrom<proto::Query> for Query {
    type Error = StorageError;

    fn try_from(q: proto::Query) -> Result<Self, Self::Error> {
        Ok(Query {
            start_ms: q.start_timestamp_ms,
            end_ms: q.end_timestamp_ms,
            matchers: q
                .matchers
                .into_iter()
                .map(MatchExpression::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<&Query> for proto::Query {
    fn from(q: &Query) -> Self {
        proto::Query {
            start_timestamp_ms: q.start_ms,
            end_timestamp_ms: q.end_ms,
            matchers: q
                .matchers
                .iter()
                .map(|m| proto::LabelMatcher {
                    r#type: match m.kind {
                        MatchKind::Eq => proto::MatchType::Eq,
                        MatchKind::Neq => proto::MatchType::Neq,
                        MatchKind::Re => proto::MatchType::Re,
                        MatchKind::Nre => proto::MatchType::Nre,
                    } as i32,
                    name: m.name.clone(),
                    value: m.value.clone(),
                })
                .collect(),
            hints: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::METRIC_NAME_LABEL;

    fn compressed(msg: &impl Message) -> Vec<u8> {
        snap::raw::Encoder::new()
            .compress_vec(&msg.encode_to_vec())
            .unwrap()
    }

    #[test]
    fn test_decode_write_request() {
        let body = compressed(&proto::WriteRequest {
            timeseries: vec![proto::TimeSeries {
                labels: vec![
                    proto::Label {
                        name: METRIC_NAME_LABEL.into(),
                        value: "cpu".into(),
                    },
                    proto::Label {
                        name: "host".into(),
                        value: "a".into(),
                    },
                ],
                samples: vec![proto::Sample {
                    value: 0.5,
                    timestamp: 1_000,
                }],
            }],
        });

        let series = decode_write_request(&body).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels[1], Label::new("host", "a"));
        assert_eq!(series[0].samples, vec![Sample::new(1_000, 0.5)]);
    }

    #[test]
    fn test_decode_read_request_ignores_hints() {
        let body = compressed(&proto::ReadRequest {
            queries: vec![proto::Query {
                start_timestamp_ms: 10,
                end_timestamp_ms: 20,
                matchers: vec![proto::LabelMatcher {
                    r#type: proto::MatchType::Nre as i32,
                    name: "job".into(),
                    value: "node|prom".into(),
                }],
                hints: Some(proto::ReadHints {
                    step_ms: 15_000,
                    func: "rate".into(),
                    ..Default::default()
                }),
            }],
            accepted_response_types: vec![],
        });

        let queries = decode_read_request(&body).unwrap();
        assert_eq!(
            queries,
            vec![Query {
                start_ms: 10,
                end_ms: 20,
                matchers: vec![MatchExpression::new("job", MatchKind::Nre, "node|prom")],
            }]
        );
    }

    #[test]
    fn test_unknown_matcher_type_fails_request() {
        let body = compressed(&proto::ReadRequest {
            queries: vec![proto::Query {
                start_timestamp_ms: 0,
                end_timestamp_ms: 0,
                matchers: vec![proto::LabelMatcher {
                    r#type: 9,
                    name: "job".into(),
                    value: "x".into(),
                }],
                hints: None,
            }],
            accepted_response_types: vec![],
        });

        let err = decode_read_request(&body).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Matcher(StorageError::UnsupportedMatcherKind(9))
        ));
    }

    #[test]
    fn test_rejects_uncompressed_body() {
        let body = [0xff_u8; 8];
        assert!(matches!(
            decode_write_request(&body),
            Err(CodecError::Snappy(_))
        ));
    }

    #[test]
    fn test_read_response_keeps_result_slots() {
        let mut ts = TimeSeries::with_labels("cpu", vec![Label::new("host", "a")]);
        ts.samples.push(Sample::new(1_000, 0.5));
        let body = encode_read_response(vec![
            QueryResult::default(),
            QueryResult {
                timeseries: vec![ts.clone()],
                malformed_rows: 0,
            },
        ])
        .unwrap();

        let results = decode_read_response(&body).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_empty());
        assert_eq!(results[1], vec![ts]);
    }
}
