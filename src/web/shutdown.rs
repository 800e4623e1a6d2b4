//! Graceful shutdown for the web server
//!
//! The listener stops on SIGINT/SIGTERM; conversions that outlived their
//! connections are then given a bounded time to finish.

use std::time::{Duration, Instant};

/// Poll interval while draining
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Shutdown result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    /// Nothing left running
    Success,
    /// Gave up with conversions still running
    Timeout { pending: usize },
}

impl ShutdownResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ShutdownResult::Success)
    }

    /// Conversions still running when the timeout hit
    pub fn pending(&self) -> Option<usize> {
        match self {
            ShutdownResult::Timeout { pending } => Some(*pending),
            ShutdownResult::Success => None,
        }
    }
}

/// Resolve when SIGINT or (on unix) SIGTERM arrives.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Wait until `pending()` reports zero or `timeout` elapses
pub async fn drain_conversions<F>(pending: F, timeout: Duration) -> ShutdownResult
where
    F: Fn() -> usize,
{
    let start = Instant::now();

    loop {
        let count = pending();
        if count == 0 {
            return ShutdownResult::Success;
        }
        if start.elapsed() >= timeout {
            return ShutdownResult::Timeout { pending: count };
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
