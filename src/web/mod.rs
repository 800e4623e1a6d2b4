//! Web server module for clipserve
//!
//! Serves the document root with byte-range support and exposes the
//! image-to-clip conversion API.
//!
//! # Endpoints
//!
//! - `POST /api/convert` - base64 image in, MP4 clip URL out
//! - `GET  /api/health`  - health check and encoder availability
//! - `GET  /api/stats`   - counters as JSON
//! - `GET  /metrics`     - counters in Prometheus text format
//! - anything else       - static file from the document root
//!
//! # Usage
//!
//! ```bash
//! clipserve serve --port 3000 --root ./public
//! ```

mod convert;
mod ingest;
mod job;
mod metrics;
mod routes;
mod server;
mod shutdown;
mod static_files;
mod worker;

pub use convert::{Converter, FfmpegCommand, ProcessOutcome};
pub use ingest::{ingest, IngestError};
pub use job::{
    sanitize_filename, ConversionJob, ConvertRequest, ConvertRequestError, DataUri, JobClock,
    JobStatus,
};
pub use metrics::{ConversionStatistics, MetricsCollector, ServeStatistics, StatsResponse};
pub use routes::{build_router, AppError, AppState};
pub use server::{ServerConfig, WebServer};
pub use shutdown::{drain_conversions, wait_for_shutdown_signal, ShutdownResult};
pub use static_files::{resolve_path, serve_file};
pub use worker::AdmissionGate;

/// Default server port
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind address
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default upload limit in bytes (20 MiB)
pub const DEFAULT_UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

/// Default encoder executable, resolved on `PATH`
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// File served for `/`
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Directory under the document root holding uploads and clips
pub const OUTPUTS_DIR: &str = "outputs";

/// Default seconds to wait for in-flight conversions on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 30;
