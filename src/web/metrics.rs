//! Metrics collection module for server monitoring
//!
//! Counters for static responses and conversions, exposed as JSON on
//! `/api/stats` and in Prometheus text format on `/metrics`.

use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Static file statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServeStatistics {
    /// 200 responses
    pub full: u64,
    /// 206 responses
    pub partial: u64,
    /// 416 responses
    pub not_satisfiable: u64,
    /// 404 responses
    pub not_found: u64,
    /// Body bytes promised via Content-Length
    pub bytes_sent: u64,
}

/// Conversion statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConversionStatistics {
    /// Conversions that reached the encoder stage
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Encoders running now
    pub active: u64,
    /// Requests waiting for an encoder slot
    pub queued: u64,
    /// Requests refused before decoding (413)
    pub uploads_rejected: u64,
    /// Requests refused while decoding (400)
    pub bad_requests: u64,
    /// Average encoder run time in seconds
    pub avg_duration_secs: f64,
}

/// Server information
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub version: String,
    pub uptime_seconds: u64,
    /// Server start time (RFC 3339)
    pub started_at: String,
}

/// Complete statistics response
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub server: ServerInfo,
    pub files: ServeStatistics,
    pub conversions: ConversionStatistics,
}

/// Thread-safe counters
#[derive(Debug)]
pub struct MetricsCollector {
    started_at: Instant,
    started_at_str: String,
    full: AtomicU64,
    partial: AtomicU64,
    not_satisfiable: AtomicU64,
    not_found: AtomicU64,
    bytes_sent: AtomicU64,
    conversions: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    uploads_rejected: AtomicU64,
    bad_requests: AtomicU64,
    total_conversion_ms: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            started_at_str: chrono::Utc::now().to_rfc3339(),
            full: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            not_satisfiable: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            conversions: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            active: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            bad_requests: AtomicU64::new(0),
            total_conversion_ms: AtomicU64::new(0),
        }
    }

    pub fn record_full(&self, bytes: u64) {
        self.full.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_partial(&self, bytes: u64) {
        self.partial.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_not_satisfiable(&self) {
        self.not_satisfiable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_request(&self) {
        self.bad_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an encoder being started
    pub fn record_conversion_started(&self) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an encoder exiting 0
    pub fn record_conversion_succeeded(&self, duration_ms: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.total_conversion_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Record an encoder failure
    pub fn record_conversion_failed(&self, duration_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.total_conversion_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Encoders currently running
    pub fn active_conversions(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn get_uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn get_serve_statistics(&self) -> ServeStatistics {
        ServeStatistics {
            full: self.full.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            not_satisfiable: self.not_satisfiable.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }

    pub fn get_conversion_statistics(&self, queued: u64) -> ConversionStatistics {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let finished = succeeded + failed;
        let total_ms = self.total_conversion_ms.load(Ordering::Relaxed);

        let avg_duration_secs = if finished > 0 {
            (total_ms as f64 / finished as f64) / 1000.0
        } else {
            0.0
        };

        ConversionStatistics {
            total: self.conversions.load(Ordering::Relaxed),
            succeeded,
            failed,
            active: self.active.load(Ordering::Relaxed),
            queued,
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            bad_requests: self.bad_requests.load(Ordering::Relaxed),
            avg_duration_secs,
        }
    }

    pub fn get_server_info(&self) -> ServerInfo {
        ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.get_uptime(),
            started_at: self.started_at_str.clone(),
        }
    }

    pub fn snapshot(&self, queued: u64) -> StatsResponse {
        StatsResponse {
            server: self.get_server_info(),
            files: self.get_serve_statistics(),
            conversions: self.get_conversion_statistics(queued),
        }
    }

    /// Format metrics in Prometheus text format
    pub fn format_prometheus(&self, queued: u64) -> String {
        let files = self.get_serve_statistics();
        let conv = self.get_conversion_statistics(queued);
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "# HELP clipserve_responses_total Static responses by status");
        let _ = writeln!(out, "# TYPE clipserve_responses_total counter");
        let _ = writeln!(out, "clipserve_responses_total{{status=\"200\"}} {}", files.full);
        let _ = writeln!(out, "clipserve_responses_total{{status=\"206\"}} {}", files.partial);
        let _ = writeln!(out, "clipserve_responses_total{{status=\"404\"}} {}", files.not_found);
        let _ = writeln!(out, "clipserve_responses_total{{status=\"416\"}} {}", files.not_satisfiable);

        let _ = writeln!(out, "\n# HELP clipserve_bytes_sent_total Static body bytes sent");
        let _ = writeln!(out, "# TYPE clipserve_bytes_sent_total counter");
        let _ = writeln!(out, "clipserve_bytes_sent_total {}", files.bytes_sent);

        let _ = writeln!(out, "\n# HELP clipserve_conversions_total Conversions by outcome");
        let _ = writeln!(out, "# TYPE clipserve_conversions_total counter");
        let _ = writeln!(out, "clipserve_conversions_total{{outcome=\"succeeded\"}} {}", conv.succeeded);
        let _ = writeln!(out, "clipserve_conversions_total{{outcome=\"failed\"}} {}", conv.failed);
        let _ = writeln!(out, "clipserve_conversions_total{{outcome=\"rejected\"}} {}", conv.uploads_rejected);
        let _ = writeln!(out, "clipserve_conversions_total{{outcome=\"bad_request\"}} {}", conv.bad_requests);

        let _ = writeln!(out, "\n# HELP clipserve_conversions_active Encoders running");
        let _ = writeln!(out, "# TYPE clipserve_conversions_active gauge");
        let _ = writeln!(out, "clipserve_conversions_active {}", conv.active);

        let _ = writeln!(out, "\n# HELP clipserve_conversions_queued Requests waiting for an encoder slot");
        let _ = writeln!(out, "# TYPE clipserve_conversions_queued gauge");
        let _ = writeln!(out, "clipserve_conversions_queued {}", conv.queued);

        let _ = writeln!(out, "\n# HELP clipserve_conversion_avg_seconds Average encoder run time");
        let _ = writeln!(out, "# TYPE clipserve_conversion_avg_seconds gauge");
        let _ = writeln!(out, "clipserve_conversion_avg_seconds {:.2}", conv.avg_duration_secs);

        let _ = writeln!(out, "\n# HELP clipserve_uptime_seconds Server uptime in seconds");
        let _ = writeln!(out, "# TYPE clipserve_uptime_seconds gauge");
        let _ = writeln!(out, "clipserve_uptime_seconds {}", self.get_uptime());

        out
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
