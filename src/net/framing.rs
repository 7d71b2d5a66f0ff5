//! Content-Length message framing for the chatroom wire protocol.
//!
//! Each frame carries one JSON document:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Header parsing is case-insensitive and accepts both CRLF and LF line
//! endings. The functions are generic over the stream so the same code runs
//! on TCP, Unix sockets and in-memory pipes.

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame body (16MB). Chat payloads are small; anything larger is a
/// broken or hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Maximum length of one header line, terminator included.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Read one Content-Length framed message from the stream.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is closed (EOF)
/// - No Content-Length header is found
/// - A header line exceeds [`MAX_HEADER_LINE`]
/// - Content-Length exceeds [`MAX_MESSAGE_SIZE`]
/// - The body cannot be read completely
/// - The body is not valid UTF-8
///
/// This future is not cancel-safe: dropping it mid-frame loses the partial
/// frame. The read loop only abandons it when the connection is released.
pub async fn read_message<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = (&mut *reader)
            .take(MAX_HEADER_LINE as u64)
            .read_line(&mut line)
            .await
            .context("Failed to read header line")?;

        if bytes_read == 0 {
            return Err(anyhow!("Connection closed by server"));
        }
        if bytes_read == MAX_HEADER_LINE && !line.ends_with('\n') {
            return Err(anyhow!(
                "Header line exceeds maximum {} bytes",
                MAX_HEADER_LINE
            ));
        }

        let trimmed = line.trim();

        // Empty line ends the header block
        if trimmed.is_empty() {
            break;
        }

        if let Some(colon_pos) = trimmed.find(':') {
            let key = trimmed[..colon_pos].trim();
            let value = trimmed[colon_pos + 1..].trim();

            if key.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid Content-Length value: {}", value))?,
                );
            }
        }
    }

    let size = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;

    if size > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message size {} exceeds maximum {} bytes",
            size,
            MAX_MESSAGE_SIZE
        ));
    }

    let mut body = vec![0u8; size];
    reader
        .read_exact(&mut body)
        .await
        .context("Failed to read message body")?;

    String::from_utf8(body).context("Message body is not valid UTF-8")
}

/// Write one Content-Length framed message and flush it.
///
/// Header and body go out in a single buffer so a concurrent reader on the
/// other side never observes a header without its body.
pub async fn write_message<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body_bytes = body.as_bytes();
    let mut frame = format!("Content-Length: {}\r\n\r\n", body_bytes.len()).into_bytes();
    frame.extend_from_slice(body_bytes);

    writer
        .write_all(&frame)
        .await
        .context("Failed to write message")?;

    writer.flush().await.context("Failed to flush message")?;

    Ok(())
}
