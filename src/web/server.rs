//! Web server implementation
//!
//! Provides the main server struct and configuration.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::routes::{build_router, AppState};
use super::shutdown::{drain_conversions, wait_for_shutdown_signal, ShutdownResult};
use super::{
    DEFAULT_BIND, DEFAULT_FFMPEG, DEFAULT_INDEX_FILE, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_UPLOAD_LIMIT,
};

/// Server configuration, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to
    pub bind: String,
    /// Document root
    pub root: PathBuf,
    /// File served for `/`
    pub index_file: String,
    /// Maximum upload size in bytes
    pub upload_limit: usize,
    /// Encoder executable
    pub ffmpeg: PathBuf,
    /// Concurrent encoder processes (0 = unbounded)
    pub max_concurrent_conversions: usize,
    /// Kill encoders running longer than this
    pub conversion_timeout: Option<Duration>,
    /// Seconds to wait for in-flight conversions on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            root: PathBuf::from("."),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            max_concurrent_conversions: num_cpus::get(),
            conversion_timeout: None,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_upload_limit(mut self, limit: usize) -> Self {
        self.upload_limit = limit;
        self
    }

    pub fn with_ffmpeg(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg = program.into();
        self
    }

    pub fn with_max_concurrent_conversions(mut self, limit: usize) -> Self {
        self.max_concurrent_conversions = limit;
        self
    }

    pub fn with_conversion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.conversion_timeout = timeout;
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}

/// Web server instance
pub struct WebServer {
    config: ServerConfig,
}

impl WebServer {
    /// Create a new web server with default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    pub async fn run(&self) -> Result<ShutdownResult, Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener, wait_for_shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves,
    /// then drain running conversions.
    pub async fn serve<F>(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> Result<ShutdownResult, Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AppState::from_config(&self.config)?);
        let router = build_router(state.clone());
        let addr = listener.local_addr()?;

        tracing::info!("serving {} on http://{}", state.root.display(), addr);
        tracing::info!("  POST /api/convert  - convert a base64 image to an MP4 clip");
        tracing::info!("  GET  /api/health   - health check");
        tracing::info!("  GET  /api/stats    - statistics");
        tracing::info!("  GET  /metrics      - Prometheus metrics");
        if !state.converter.ffmpeg().is_available() {
            tracing::warn!(
                "encoder {} not found; conversions will fail",
                state.converter.ffmpeg().program().display()
            );
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        let pending = || {
            state.metrics.active_conversions() as usize + state.converter.gate().waiting()
        };
        let result = drain_conversions(
            pending,
            Duration::from_secs(self.config.shutdown_timeout_secs),
        )
        .await;

        match &result {
            ShutdownResult::Success => tracing::info!("shutdown complete"),
            ShutdownResult::Timeout { pending } => {
                tracing::warn!("shutdown timed out with {} conversions running", pending)
            }
        }
        Ok(result)
    }
}

impl Default for WebServer {
    fn default() -> Self {
        Self::new()
    }
}
