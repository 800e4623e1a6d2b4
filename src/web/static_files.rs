//! Static file responder with single byte-range support
//!
//! Resolves request paths under the document root, refuses anything that
//! would leave it, and streams either the whole file (200) or one
//! inclusive byte window (206).

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::metrics::MetricsCollector;
use super::routes::AppError;
use crate::mime::content_type_for;
use crate::range::{RangeDecision, RangeSpec};

/// Map a request path onto the document root.
///
/// `/` maps to `index_file`. The path is percent-decoded first; parent,
/// root, or drive-prefix components and NUL bytes make it unresolvable.
/// This check is lexical; [`serve_file`] also rejects symlinks that lead
/// outside the root.
pub fn resolve_path(root: &Path, request_path: &str, index_file: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let relative = if decoded == "/" {
        index_file
    } else {
        decoded.trim_start_matches('/')
    };

    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Serve `path` (already resolved under `root`) honouring any `Range` header.
///
/// `root` must be canonical. HEAD requests get headers only.
pub async fn serve_file(
    root: &Path,
    path: &Path,
    method: &Method,
    headers: &HeaderMap,
    metrics: &MetricsCollector,
) -> Result<Response, AppError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| AppError::NotFound)?;
    if !canonical.starts_with(root) {
        tracing::warn!("refusing {}: outside document root", canonical.display());
        return Err(AppError::NotFound);
    }

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| AppError::NotFound)?;
    if !metadata.is_file() {
        return Err(AppError::NotFound);
    }

    let total = metadata.len();
    let content_type = content_type_for(&canonical);
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match RangeDecision::for_request(range, total) {
        RangeDecision::Full => {
            tracing::debug!(path = %canonical.display(), total, "serving full file");
            let body = file_body(&canonical, method, None).await?;
            metrics.record_full(total);
            Ok(file_response(StatusCode::OK, content_type, total, None, body))
        }
        RangeDecision::Partial(spec) => {
            tracing::debug!(
                path = %canonical.display(),
                start = spec.start,
                end = spec.end,
                total,
                "serving partial content"
            );
            let body = file_body(&canonical, method, Some(spec)).await?;
            metrics.record_partial(spec.len());
            Ok(file_response(
                StatusCode::PARTIAL_CONTENT,
                content_type,
                spec.len(),
                Some(spec.content_range(total)),
                body,
            ))
        }
        RangeDecision::NotSatisfiable { size } => Err(AppError::RangeNotSatisfiable { size }),
    }
}

/// Open the file and stream either all of it or just `range`
async fn file_body(path: &Path, method: &Method, range: Option<RangeSpec>) -> Result<Body, AppError> {
    if *method == Method::HEAD {
        return Ok(Body::empty());
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| AppError::NotFound)?;

    match range {
        None => Ok(Body::from_stream(ReaderStream::new(file))),
        Some(spec) => {
            file.seek(SeekFrom::Start(spec.start))
                .await
                .map_err(|_| AppError::NotFound)?;
            Ok(Body::from_stream(ReaderStream::new(file.take(spec.len()))))
        }
    }
}

fn file_response(
    status: StatusCode,
    content_type: &'static str,
    content_length: u64,
    content_range: Option<String>,
    body: Body,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = content_range.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(header::CONTENT_RANGE, value);
    }

    (status, headers, body).into_response()
}
