//! Length-prefixed JSON framing.
//!
//! # Wire format
//!
//! ```text
//! FRAME:
//!   [4 bytes BE: payload_len]
//!   [payload_len bytes: UTF-8 JSON object]
//!
//! CHUNK (sender -> receiver):
//!   FRAME(ChunkHeader)
//!   [chunk_size bytes: raw chunk data, unframed]
//! ```
//!
//! Readers either get a whole frame or an error; a stream that ends part
//! way through a frame is a [`DataChannelError::Framing`] error.

use std::io::ErrorKind;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DataChannelError;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Writes one frame carrying `payload` and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), DataChannelError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        DataChannelError::Protocol(format!(
            "frame payload too large: {} bytes (max {})",
            payload.len(),
            u32::MAX
        ))
    })?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. With `max_len` set, larger frames are refused before
/// their payload is read.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: Option<usize>,
) -> Result<Vec<u8>, DataChannelError> {
    let len = reader
        .read_u32()
        .await
        .map_err(|e| eof_to_framing(e, "frame length"))? as usize;

    if let Some(max) = max_len {
        if len > max {
            return Err(DataChannelError::Protocol(format!(
                "frame of {len} bytes exceeds limit of {max}"
            )));
        }
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| eof_to_framing(e, "frame payload"))?;
    Ok(payload)
}

/// Serializes `payload` as JSON and sends it as one frame.
pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &serde_json::Value,
) -> Result<(), DataChannelError> {
    send_json(writer, payload).await
}

/// Receives one frame and decodes it as a JSON value.
pub async fn receive_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<serde_json::Value, DataChannelError> {
    receive_json(reader).await
}

/// Like [`receive_message`] but refuses frames longer than `max_len`.
pub async fn receive_message_bounded<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<serde_json::Value, DataChannelError> {
    let payload = read_frame(reader, Some(max_len)).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Sends any serializable value as one JSON frame.
pub async fn send_json<W, T>(writer: &mut W, value: &T) -> Result<(), DataChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

/// Receives one JSON frame and decodes it into `T`.
pub async fn receive_json<R, T>(reader: &mut R) -> Result<T, DataChannelError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader, None).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Reads exactly `len` raw bytes.
pub async fn read_exact_bytes<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> Result<Vec<u8>, DataChannelError> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| eof_to_framing(e, "raw chunk data"))?;
    Ok(buf)
}

/// Writes raw bytes and flushes.
pub async fn write_raw<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), DataChannelError> {
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

fn eof_to_framing(err: std::io::Error, what: &str) -> DataChannelError {
    if err.kind() == ErrorKind::UnexpectedEof {
        DataChannelError::Framing(format!("stream closed while reading {what}"))
    } else {
        DataChannelError::Io(err)
    }
}
