//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Length-prefixed message framing.
//!
//! # Protocol
//!
//! ```text
//! +------------------+-------------------+
//! | Length (4 bytes) | Payload (N bytes) |
//! +------------------+-------------------+
//! ```
//!
//! - **Length**: u32 in big-endian format, the payload size in bytes
//! - **Payload**: a JSON document

use crate::transport::TransportError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the frame length header in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Writes a length-prefixed frame and flushes the writer.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`], or an I/O error if writing fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] if the header announces more
/// than [`MAX_FRAME_SIZE`] bytes, or an I/O error if the stream ends before
/// the full frame arrives.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Serializes a message as JSON and writes it as one frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}

/// Decodes a frame payload previously read with [`read_frame`].
pub fn decode<T>(payload: &[u8]) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(payload).map_err(TransportError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use serde_json::json;

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"Hello").await.unwrap();

        assert_eq!(&buffer[0..4], &5u32.to_be_bytes());
        assert_eq!(&buffer[4..], b"Hello");

        let mut reader = &buffer[..];
        assert_eq!(read_frame(&mut reader).await.unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn test_consecutive_messages() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &Request::new(1, "math.add", json!({ "a": 1 })))
            .await
            .unwrap();
        write_message(&mut buffer, &Response { id: 1, reply: json!(3) })
            .await
            .unwrap();

        let mut reader = &buffer[..];
        let request: Request = decode(&read_frame(&mut reader).await.unwrap()).unwrap();
        let response: Response = decode(&read_frame(&mut reader).await.unwrap()).unwrap();

        assert_eq!(request.path(), Some("math.add"));
        assert_eq!(response.reply, json!(3));
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes());

        let mut reader = &buffer[..];
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_be_bytes());
        buffer.extend_from_slice(b"short");

        let mut reader = &buffer[..];
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::Io { .. })));
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let result: Result<Request, _> = decode(b"not json");
        assert!(matches!(result, Err(TransportError::Codec(_))));
    }
}
