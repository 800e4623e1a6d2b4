//! Bounded request-body accumulation
//!
//! Collects an incoming body chunk by chunk and gives up as soon as the
//! running total passes the limit, without waiting for the stream to end.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Body ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// More than `limit` bytes arrived
    #[error("Payload too large: more than {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The body stream itself failed (client went away, malformed chunking)
    #[error("Failed to read request body: {0}")]
    Stream(String),
}

/// Accumulate `body` into memory, failing once more than `limit` bytes arrive.
///
/// The stream is not polled again after the limit is crossed.
pub async fn ingest<S, E>(mut body: S, limit: usize) -> Result<Bytes, IngestError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut buffer = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| IngestError::Stream(e.to_string()))?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > limit {
            return Err(IngestError::PayloadTooLarge { limit });
        }
    }

    Ok(buffer.freeze())
}
