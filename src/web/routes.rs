//! HTTP routes for the web server
//!
//! `POST /api/convert` feeds the conversion pipeline; every other request
//! that is not an API endpoint is answered from the document root.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::convert::{Converter, FfmpegCommand};
use super::ingest::{ingest, IngestError};
use super::job::ConvertRequestError;
use super::metrics::{MetricsCollector, StatsResponse};
use super::server::ServerConfig;
use super::static_files::{resolve_path, serve_file};
use super::worker::AdmissionGate;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Canonical document root
    pub root: PathBuf,
    pub index_file: String,
    pub upload_limit: usize,
    pub converter: Arc<Converter>,
    pub metrics: Arc<MetricsCollector>,
    pub version: String,
}

impl AppState {
    /// Build state from configuration. Fails if the document root does not exist.
    pub fn from_config(config: &ServerConfig) -> std::io::Result<Self> {
        let root = config.root.canonicalize()?;
        let metrics = Arc::new(MetricsCollector::new());
        let ffmpeg = FfmpegCommand::new(&config.ffmpeg).with_timeout(config.conversion_timeout);
        let converter = Converter::new(
            root.join(super::OUTPUTS_DIR),
            ffmpeg,
            AdmissionGate::new(config.max_concurrent_conversions),
            metrics.clone(),
        );

        Ok(Self {
            root,
            index_file: config.index_file.clone(),
            upload_limit: config.upload_limit,
            converter: Arc::new(converter),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// Build the full router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/convert",
            post(upload_and_convert).fallback(static_file),
        )
        .route("/api/health", get(health_check))
        .route("/api/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .fallback(static_file)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
}

/// API error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("File not found")]
    NotFound,

    #[error("Range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conversion failed")]
    ConversionFailed,
}

impl From<ConvertRequestError> for AppError {
    fn from(e: ConvertRequestError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "404 - File not found").into_response(),
            AppError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                Body::empty(),
            )
                .into_response(),
            // Connection: close makes the server drop the socket after
            // writing this response, leaving the rest of the body unread.
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                [(header::CONNECTION, "close")],
                "Payload too large",
            )
                .into_response(),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            AppError::ConversionFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Conversion failed").into_response()
            }
        }
    }
}

/// Static file fallback
async fn static_file(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let result = match resolve_path(&state.root, uri.path(), &state.index_file) {
        Some(path) => serve_file(&state.root, &path, &method, &headers, &state.metrics).await,
        None => {
            tracing::warn!("rejected unresolvable path {}", uri.path());
            Err(AppError::NotFound)
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            match e {
                AppError::NotFound => state.metrics.record_not_found(),
                AppError::RangeNotSatisfiable { .. } => state.metrics.record_not_satisfiable(),
                _ => {}
            }
            e.into_response()
        }
    }
}

/// Conversion response
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub url: String,
}

/// Ingest a JSON image upload and convert it to a clip
async fn upload_and_convert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ConvertResponse>, AppError> {
    let limit = state.upload_limit;

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        state.metrics.record_upload_rejected();
        tracing::warn!("rejected upload: declared length exceeds {} bytes", limit);
        return Err(AppError::PayloadTooLarge);
    }

    let bytes = match ingest(body.into_data_stream(), limit).await {
        Ok(bytes) => bytes,
        Err(IngestError::PayloadTooLarge { limit }) => {
            state.metrics.record_upload_rejected();
            tracing::warn!("rejected upload: body exceeded {} bytes", limit);
            return Err(AppError::PayloadTooLarge);
        }
        Err(e @ IngestError::Stream(_)) => return Err(AppError::BadRequest(e.to_string())),
    };

    let job = state.converter.convert(&bytes).await?;
    Ok(Json(ConvertResponse {
        url: job.output_url(),
    }))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub encoder: EncoderStatus,
}

#[derive(Debug, Serialize)]
pub struct EncoderStatus {
    pub program: String,
    pub available: bool,
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ffmpeg = state.converter.ffmpeg();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        encoder: EncoderStatus {
            program: ffmpeg.program().display().to_string(),
            available: ffmpeg.is_available(),
        },
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let queued = state.converter.gate().waiting() as u64;
    Json(state.metrics.snapshot(queued))
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let queued = state.converter.gate().waiting() as u64;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.format_prometheus(queued),
    )
}
