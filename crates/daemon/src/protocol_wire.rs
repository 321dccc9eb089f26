// SPDX-License-Identifier: MIT

//! Wire format: a 2-byte big-endian header length, a JSON header object
//! (carrying `content-length` and `content-type`, plus any extra fields),
//! and a JSON body of exactly `content-length` bytes.
//!
//! ```text
//! ┌────────────┬────────────────────┬───────────────────┐
//! │ 2-byte LEN │ header (JSON, LEN) │ body (JSON, H.CL) │
//! └────────────┴────────────────────┴───────────────────┘
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::{Request, Response};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("header too large: {size} bytes (max {max})")]
    HeaderTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
}

/// Header length is a `u16`, so the header itself can never exceed this.
pub const MAX_HEADER_SIZE: usize = u16::MAX as usize;

fn build_header(body_len: usize, extra: &[(&'static str, Value)]) -> Value {
    let mut header = Map::new();
    header.insert("content-length".to_string(), Value::from(body_len));
    header.insert(
        "content-type".to_string(),
        Value::String("text/json".to_string()),
    );
    for (key, value) in extra {
        header.insert(key.to_string(), value.clone());
    }
    Value::Object(header)
}

/// Encode a `T` as a full frame: header-length prefix + header + body.
fn encode<T: Serialize>(
    body: &T,
    extra_header: &[(&'static str, Value)],
) -> Result<Vec<u8>, ProtocolError> {
    let body_bytes = serde_json::to_vec(body)?;
    let header = build_header(body_bytes.len(), extra_header);
    let header_bytes = serde_json::to_vec(&header)?;

    if header_bytes.len() > MAX_HEADER_SIZE {
        return Err(ProtocolError::HeaderTooLarge {
            size: header_bytes.len(),
            max: MAX_HEADER_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(2 + header_bytes.len() + body_bytes.len());
    frame.extend_from_slice(&(header_bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(&body_bytes);
    Ok(frame)
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, ProtocolError> {
    encode(req, &[("message-class", Value::String("CommandMessage".into()))])
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, ProtocolError> {
    encode(resp, &[("message-class", Value::String("StatusMessage".into()))])
}

/// Read one frame from an async reader, returning the raw header and body
/// bytes. Blocks until `content-length` bytes of body have arrived.
pub async fn read_frame<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<(Value, Vec<u8>), ProtocolError> {
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let header_len = u16::from_be_bytes(len_buf) as usize;

    let mut header_buf = vec![0u8; header_len];
    reader.read_exact(&mut header_buf).await?;
    let header: Value = serde_json::from_slice(&header_buf)?;

    let content_length = header
        .get("content-length")
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MalformedHeader("missing content-length"))? as usize;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok((header, body))
}

pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Request, ProtocolError> {
    let (_header, body) = read_frame(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
) -> Result<(), ProtocolError> {
    let frame = encode_response(response)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Client side of the same frame: send a request, then read back the
/// response body directly (skipping the header, same as `read_request`).
pub async fn write_request<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
) -> Result<(), ProtocolError> {
    let frame = encode_request(request)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_response<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Response, ProtocolError> {
    let (_header, body) = read_frame(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
#[path = "protocol_wire_tests.rs"]
mod tests;
