//! Newline-delimited JSON framing over a TCP stream.
//!
//! One frame is one JSON object followed by `\n`. The bridge treats a
//! malformed inbound frame as a hard error; the plant logs and drops it.

use arrayvec::ArrayString;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::DomeError;

/// Upper bound on a single frame. Status snapshots with the louver arrays
/// are the largest frames and stay well below this.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Bounded scratch buffer for inbound frames.
pub type FrameBuffer = ArrayString<MAX_FRAME_SIZE>;

/// Serialize `data` as one line and flush it.
pub async fn write_frame<W, T>(writer: &mut W, data: &T) -> Result<(), DomeError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(data)?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(DomeError::FrameTooLarge(MAX_FRAME_SIZE));
    }
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one line and parse it as a JSON object.
///
/// Returns `Ok(None)` on a cleanly closed connection. A line that is not a
/// JSON object is a [`DomeError::MalformedReply`]; the caller decides
/// whether that is fatal (bridge) or skippable (plant).
pub async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<Value>, DomeError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DomeError::MalformedReply("empty frame".into()));
    }
    let mut buffer = FrameBuffer::new();
    if buffer.try_push_str(trimmed).is_err() {
        return Err(DomeError::FrameTooLarge(MAX_FRAME_SIZE));
    }
    let value: Value = serde_json::from_str(&buffer)
        .map_err(|e| DomeError::MalformedReply(format!("{e}: {trimmed:.80}")))?;
    if !value.is_object() {
        return Err(DomeError::MalformedReply(format!(
            "expected a JSON object, got {trimmed:.80}"
        )));
    }
    Ok(Some(value))
}
