//! Web API integration tests
//!
//! Drives the full router in-process with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use clipserve::web::build_router;
use clipserve::{AppState, ServerConfig};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const CONTENT: &[u8] = b"0123456789abcdefghij";

fn document_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"<h1>home</h1>").unwrap();
    std::fs::write(dir.path().join("clip.mp4"), CONTENT).unwrap();
    std::fs::create_dir(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets").join("app.js"), b"console.log(1)").unwrap();
    dir
}

fn router(config: ServerConfig) -> Router {
    build_router(Arc::new(AppState::from_config(&config).unwrap()))
}

fn router_for(root: &Path) -> Router {
    router(ServerConfig::default().with_root(root))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_range(uri: &str, range: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::RANGE, range)
        .body(Body::empty())
        .unwrap()
}

fn convert_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn image_upload() -> String {
    serde_json::json!({
        "data": "data:image/png;base64,aGVsbG8gd29ybGQ=",
        "filename": "photo.png",
    })
    .to_string()
}

fn outputs_entries(root: &Path) -> Vec<String> {
    match std::fs::read_dir(root.join("outputs")) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Static: whole file
    #[tokio::test]
    async fn test_full_file() {
        let root = document_root();
        let (status, headers, body) = send(router_for(root.path()), get("/clip.mp4")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, CONTENT);
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(headers[header::CONTENT_LENGTH], "20");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let root = document_root();
        let (status, headers, body) = send(router_for(root.path()), get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>home</h1>");
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn test_nested_file_and_query_string() {
        let root = document_root();
        let (status, headers, body) =
            send(router_for(root.path()), get("/assets/app.js?v=3")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"console.log(1)");
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let root = document_root();
        let (status, _, body) = send(router_for(root.path()), get("/nope.txt")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"404 - File not found");
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let root = document_root();
        let (status, _, _) = send(router_for(root.path()), get("/assets")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // Static: traversal
    #[tokio::test]
    async fn test_traversal_rejected() {
        let root = document_root();
        for uri in [
            "/../../etc/passwd",
            "/%2e%2e/%2e%2e/etc/passwd",
            "/assets/..%2f..%2fetc/passwd",
        ] {
            let (status, _, body) = send(router_for(root.path()), get(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body, b"404 - File not found");
        }
    }

    // Static: byte ranges
    #[tokio::test]
    async fn test_partial_window() {
        let root = document_root();
        let (status, headers, body) =
            send(router_for(root.path()), get_range("/clip.mp4", "bytes=0-4")).await;

        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, b"01234");
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-4/20");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    }

    #[tokio::test]
    async fn test_open_ended_range() {
        let root = document_root();
        let (status, headers, body) =
            send(router_for(root.path()), get_range("/clip.mp4", "bytes=15-")).await;

        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, b"fghij");
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 15-19/20");
    }

    #[tokio::test]
    async fn test_last_byte_range() {
        let root = document_root();
        let (status, _, body) =
            send(router_for(root.path()), get_range("/clip.mp4", "bytes=19-19")).await;

        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, b"j");
    }

    #[tokio::test]
    async fn test_range_not_satisfiable() {
        let root = document_root();
        for range in ["bytes=20-", "bytes=5-20", "bytes=9-3"] {
            let (status, headers, body) =
                send(router_for(root.path()), get_range("/clip.mp4", range)).await;

            assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE, "{}", range);
            assert_eq!(headers[header::CONTENT_RANGE], "bytes */20");
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_range_serves_full_file() {
        let root = document_root();
        let (status, _, body) =
            send(router_for(root.path()), get_range("/clip.mp4", "bytes=abc")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, CONTENT);
    }

    #[tokio::test]
    async fn test_head_has_headers_only() {
        let root = document_root();
        let request = Request::builder()
            .method("HEAD")
            .uri("/clip.mp4")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router_for(root.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_LENGTH], "20");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_get_convert_path_is_static() {
        let root = document_root();
        let (status, _, _) = send(router_for(root.path()), get("/api/convert")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // Conversion: request validation
    #[tokio::test]
    async fn test_convert_invalid_data_uri() {
        let root = document_root();
        let body = r#"{"data":"not-a-uri","filename":"a.png"}"#;
        let (status, _, body) = send(router_for(root.path()), convert_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Bad request: Invalid data URI");
        assert!(!root.path().join("outputs").exists());
    }

    #[tokio::test]
    async fn test_convert_invalid_json() {
        let root = document_root();
        let (status, _, body) = send(router_for(root.path()), convert_request("{oops")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().starts_with("Bad request: Invalid JSON"));
        assert!(!root.path().join("outputs").exists());
    }

    #[tokio::test]
    async fn test_convert_missing_filename() {
        let root = document_root();
        let body = r#"{"data":"data:image/png;base64,aGk="}"#;
        let (status, _, body) = send(router_for(root.path()), convert_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Bad request: Missing data");
    }

    // Conversion: upload limit
    #[tokio::test]
    async fn test_convert_body_over_limit() {
        let root = document_root();
        let app = router(
            ServerConfig::default()
                .with_root(root.path())
                .with_upload_limit(64),
        );
        let (status, headers, body) = send(app, convert_request(vec![b'x'; 65])).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(headers[header::CONNECTION], "close");
        assert_eq!(body, b"Payload too large");
        assert!(outputs_entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_convert_declared_length_over_limit() {
        let root = document_root();
        let request = Request::builder()
            .method("POST")
            .uri("/api/convert")
            .header(header::CONTENT_LENGTH, (21 * 1024 * 1024).to_string())
            .body(Body::from(image_upload()))
            .unwrap();
        let (status, _, _) = send(router_for(root.path()), request).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(outputs_entries(root.path()).is_empty());
    }

    // Conversion: encoder outcomes
    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_success_removes_input() {
        let root = document_root();
        let app = router(ServerConfig::default().with_root(root.path()).with_ffmpeg("true"));
        let (status, _, body) = send(app, convert_request(image_upload())).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let url = json["url"].as_str().unwrap();
        let stamp = url
            .strip_prefix("/outputs/")
            .and_then(|name| name.strip_suffix("-converted.mp4"))
            .unwrap();
        assert!(!stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()), "{}", url);

        assert!(outputs_entries(root.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_failure_keeps_input() {
        let root = document_root();
        let app = router(ServerConfig::default().with_root(root.path()).with_ffmpeg("false"));
        let (status, _, body) = send(app, convert_request(image_upload())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Conversion failed");

        let entries = outputs_entries(root.path());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with("-photo.png"));
        let saved = std::fs::read(root.path().join("outputs").join(&entries[0])).unwrap();
        assert_eq!(saved, b"hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_strips_client_directories() {
        let root = document_root();
        let app = router(ServerConfig::default().with_root(root.path()).with_ffmpeg("false"));
        let body = serde_json::json!({
            "data": "data:image/png;base64,aGk=",
            "filename": "../../evil/shot.png",
        })
        .to_string();
        let (status, _, _) = send(app, convert_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let entries = outputs_entries(root.path());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with("-shot.png"));
        assert!(!root.path().join("evil").exists());
    }

    #[tokio::test]
    async fn test_convert_missing_encoder() {
        let root = document_root();
        let app = router(
            ServerConfig::default()
                .with_root(root.path())
                .with_ffmpeg("clipserve-no-such-encoder"),
        );
        let (status, _, body) = send(app, convert_request(image_upload())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Conversion failed");
    }

    // Operational endpoints
    #[tokio::test]
    async fn test_health_endpoint() {
        let root = document_root();
        let (status, _, body) = send(router_for(root.path()), get("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["encoder"]["program"], "ffmpeg");
    }

    #[tokio::test]
    async fn test_stats_count_requests() {
        let root = document_root();
        let app = router_for(root.path());

        let _ = send(app.clone(), get("/clip.mp4")).await;
        let _ = send(app.clone(), get_range("/clip.mp4", "bytes=0-1")).await;
        let _ = send(app.clone(), get("/missing")).await;
        let (status, _, body) = send(app, get("/api/stats")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["files"]["full"], 1);
        assert_eq!(json["files"]["partial"], 1);
        assert_eq!(json["files"]["not_found"], 1);
        assert_eq!(json["files"]["bytes_sent"], 22);
        assert_eq!(json["conversions"]["total"], 0);
    }

    #[tokio::test]
    async fn test_prometheus_endpoint() {
        let root = document_root();
        let app = router_for(root.path());
        let _ = send(app.clone(), get("/clip.mp4")).await;
        let (status, headers, body) = send(app, get("/metrics")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("clipserve_responses_total{status=\"200\"} 1"));
        assert!(text.contains("clipserve_conversions_active 0"));
    }
}
