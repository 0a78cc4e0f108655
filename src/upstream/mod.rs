//! Upstream chat service.
//!
//! [`UpstreamClient`] is the seam between the gateway and the network: one
//! call opens a chat turn and hands back the raw response as a stream of
//! lines, a second claims a pending reward. [`YuppClient`] is the reqwest
//! implementation.

mod client;
mod error;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;

pub use client::{chat_payload, extract_balance, YuppClient};
pub use error::{classify_http_status, UpstreamError};

/// Response body split into lines, without terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// One upstream chat turn.
#[derive(Debug, Clone)]
pub struct ChatCall {
    /// Single-turn transcript produced by the formatter.
    pub transcript: String,
    /// Internal upstream model name.
    pub model_name: String,
    /// Whether the client asked for a streaming response.
    pub stream: bool,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Open a chat turn with the given session token.
    ///
    /// Returns once response headers arrived with a 2xx status; the body is
    /// read lazily through the returned stream. Dropping the stream releases
    /// the connection.
    async fn open_chat(&self, token: &str, call: &ChatCall) -> Result<LineStream, UpstreamError>;

    /// Claim a reward for the account, returning the new credit balance.
    async fn claim_reward(&self, token: &str, reward_id: &str) -> Result<f64, UpstreamError>;
}

pub type SharedUpstream = Arc<dyn UpstreamClient>;

/// Split a byte stream into lines. `\r\n` and `\n` both terminate a line; a
/// trailing line without terminator is still yielded.
///
/// Splitting happens on raw bytes. Invalid UTF-8 inside a line is replaced,
/// so only transport failures end the stream with an error.
pub fn response_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: bytes::Buf + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(bytes.map_err(std::io::Error::other));
    let codec = AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec());
    Box::pin(
        FramedRead::new(reader, codec)
            .map_ok(|line| line_text(&line))
            .map_err(|e| UpstreamError::Stream(e.to_string())),
    )
}

fn line_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
