//! JSON body codec layered on top of [`framing`](super::framing).
//!
//! Generic over the message type so the same helpers serve both directions:
//! the client encodes [`ClientMessage`](crate::models::ClientMessage) and
//! decodes [`ServerMessage`](crate::models::ServerMessage); test servers do the
//! reverse.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::framing::{read_message, write_message};

pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).context("Failed to serialize message")
}

/// Longest piece of a bad frame quoted in a decode error.
const ERROR_PREVIEW_BYTES: usize = 200;

pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .with_context(|| format!("Failed to parse message: {}", preview(body)))
}

/// The start of `body`, cut on a char boundary.
fn preview(body: &str) -> String {
    if body.len() <= ERROR_PREVIEW_BYTES {
        return body.to_string();
    }
    let mut end = ERROR_PREVIEW_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}

/// Read and decode the next frame.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let body = read_message(reader).await?;
    decode(&body)
}

/// Encode and write one frame.
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = encode(message)?;
    write_message(writer, &body).await
}
