//! Length-prefixed JSON framing for TCP streams
//!
//! ```text
//! [ 4 bytes: body length (u32, big-endian) ][ N bytes: JSON Envelope ]
//! ```
//!
//! A frame whose body fails to parse is still consumed, so the stream stays
//! aligned and the peer can be told what went wrong. A bad length prefix
//! leaves nothing to resynchronise on.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Envelope;

/// Largest accepted frame body (10 MiB)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("envelope of {0} bytes exceeds the {MAX_MESSAGE_SIZE} byte frame limit")]
    MessageTooLarge(usize),

    #[error("frame length prefix {0} exceeds the {MAX_MESSAGE_SIZE} byte frame limit")]
    InvalidLength(u32),

    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Whether the stream is still aligned on a frame boundary after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Json(_))
    }
}

/// Serialize an envelope into one frame
pub fn encode(envelope: &Envelope) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(envelope)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or(CodecError::MessageTooLarge(body.len()))?;

    let mut frame = BytesMut::with_capacity(PREFIX_LEN + body.len());
    frame.put_u32(len);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Take one frame off the front of `buf`
///
/// `Ok(None)` means the frame is not complete yet and nothing was consumed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
    let Some(prefix) = buf.get(..PREFIX_LEN) else {
        return Ok(None);
    };
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(len));
    }
    if buf.len() < PREFIX_LEN + len as usize {
        return Ok(None);
    }

    buf.advance(PREFIX_LEN);
    let body = buf.split_to(len as usize);
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Accumulates stream reads and yields complete envelopes
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete envelope; call until `Ok(None)` to drain the buffer
    pub fn decode_next(&mut self) -> Result<Option<Envelope>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Bytes received but not yet decoded
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}
