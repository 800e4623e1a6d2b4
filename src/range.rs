//! Single byte-range parsing for `Range: bytes=<start>-<end>` headers
//!
//! Only one range is understood. The header value is split on `-` and each
//! side is read as the run of leading ASCII digits, so trailing garbage is
//! ignored. A multi-range value such as `bytes=0-1,5-6` therefore resolves
//! to `0-1`.
//!
//! Satisfiability is stricter than RFC 9110: an `end` at or past the file
//! size is rejected instead of clamped.

use thiserror::Error;

/// Range header errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header could not be read as `bytes=<start>-<end>`
    #[error("Malformed range header: {0}")]
    Malformed(String),

    /// The range lies outside a resource of `size` bytes
    #[error("Range not satisfiable for {size} bytes")]
    NotSatisfiable { size: u64 },
}

/// Inclusive byte window into a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive)
    pub end: u64,
}

impl RangeSpec {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a resource of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// Parse a header value against a resource of `total` bytes.
    ///
    /// `end` defaults to `total - 1` when omitted.
    pub fn parse(header: &str, total: u64) -> Result<Self, RangeError> {
        let spec = header.replacen("bytes=", "", 1);
        let mut positions = spec.split('-');

        let start_token = positions.next().unwrap_or("");
        let start = leading_integer(start_token)
            .ok_or_else(|| RangeError::Malformed(format!("no start offset in {:?}", header)))?;

        let end = match positions.next() {
            Some(token) if !token.is_empty() => leading_integer(token)
                .ok_or_else(|| RangeError::Malformed(format!("bad end offset in {:?}", header)))?,
            _ => total.saturating_sub(1),
        };

        if start >= total || end >= total || end < start {
            return Err(RangeError::NotSatisfiable { size: total });
        }

        Ok(Self { start, end })
    }
}

/// Outcome of inspecting an optional `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// Serve the whole resource with 200
    Full,
    /// Serve the window with 206
    Partial(RangeSpec),
    /// Reply 416 with `Content-Range: bytes */<size>`
    NotSatisfiable { size: u64 },
}

impl RangeDecision {
    /// Decide how to answer a request for a resource of `total` bytes.
    ///
    /// A malformed header is ignored and the full body is served.
    pub fn for_request(header: Option<&str>, total: u64) -> Self {
        let Some(header) = header else {
            return RangeDecision::Full;
        };

        match RangeSpec::parse(header, total) {
            Ok(spec) => RangeDecision::Partial(spec),
            Err(RangeError::NotSatisfiable { size }) => RangeDecision::NotSatisfiable { size },
            Err(RangeError::Malformed(reason)) => {
                tracing::debug!("ignoring range header: {}", reason);
                RangeDecision::Full
            }
        }
    }
}

/// Read the run of leading ASCII digits, skipping leading whitespace.
///
/// Values too large for `u64` saturate, which makes them unsatisfiable.
fn leading_integer(token: &str) -> Option<u64> {
    let token = token.trim_start();
    let digits_len = token.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let digits = &token[..digits_len];
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}
