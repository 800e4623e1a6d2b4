//! clipserve - static file server with range support and image-to-clip conversion
//!
//! Serves files from a document root with single byte-range support, and
//! accepts base64 image uploads on `POST /api/convert` that an external
//! ffmpeg process turns into a short MP4 clip.
//!
//! # Example
//!
//! ```rust,no_run
//! use clipserve::{ServerConfig, WebServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = ServerConfig::default().with_port(3000).with_root("./public");
//! WebServer::with_config(config).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod mime;
pub mod range;
pub mod web;

pub use cli::{Cli, Commands, ServeArgs};
pub use config::{CliOverrides, Config, ConfigError};
pub use mime::content_type_for;
pub use range::{RangeDecision, RangeError, RangeSpec};
pub use web::{
    AppError, AppState, ConversionJob, ConvertRequest, FfmpegCommand, JobStatus, MetricsCollector,
    ServerConfig, WebServer,
};

/// Process exit codes
pub mod exit_codes {
    /// Successful run
    pub const SUCCESS: i32 = 0;
    /// Unspecified failure
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration could not be loaded or is invalid
    pub const INVALID_CONFIG: i32 = 2;
}
