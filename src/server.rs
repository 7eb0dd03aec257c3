//! HTTP server for the Prometheus remote storage endpoints.
//!
//! - `POST /write`: snappy-compressed protobuf `WriteRequest`, 204 on success
//! - `POST /read`: snappy-compressed protobuf `ReadRequest`, answered in kind
//! - `GET /metrics`: request and row counters in Prometheus text format
//! - `GET /healthz`, `GET /readyz`: liveness and readiness probes

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::remote::{self, CodecError};
use crate::storage::{SeriesReader, SeriesWriter, StatsSnapshot, StorageError, StorageStats};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub writer: SeriesWriter,
    pub reader: SeriesReader,
    pub stats: Arc<StorageStats>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<StatsSnapshot>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/write", post(write_handler))
        .route("/read", post(read_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

fn status_for(err: &StorageError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn storage_error_response(err: StorageError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, %status, "Storage request failed");
    }
    (status, err.to_string()).into_response()
}

fn codec_error_response(err: CodecError) -> Response {
    tracing::debug!(error = %err, "Rejected undecodable request body");
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

/// Remote write endpoint.
async fn write_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let series = match remote::decode_write_request(&body) {
        Ok(series) => series,
        Err(e) => return codec_error_response(e),
    };

    match state.writer.write(&series).await {
        Ok(rows) => {
            tracing::debug!(series = series.len(), rows, "Remote write stored");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => storage_error_response(e),
    }
}

/// Remote read endpoint.
async fn read_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let queries = match remote::decode_read_request(&body) {
        Ok(queries) => queries,
        Err(e) => return codec_error_response(e),
    };

    let results = match state.reader.read(queries).await {
        Ok(results) => results,
        Err(e) => return storage_error_response(e),
    };

    match remote::encode_read_response(results) {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "application/x-protobuf"),
                (header::CONTENT_ENCODING, "snappy"),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode read response");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Prometheus exposition of the storage counters.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.stats.registry().gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Liveness probe with request counters.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
        stats: Some(state.stats.snapshot()),
    })
}

/// Readiness probe that checks DuckDB availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
            stats: None,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                    stats: None,
                }),
            )
                .into_response()
        }
    }
}

async fn fallback_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "promduck: not found")
}
