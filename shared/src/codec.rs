//! Length-prefixed codec for broadcast intents
//!
//! Every intent on the broadcast bus is framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf Intent ]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::Intent;

/// Maximum intent size (64 KB); status pushes are tiny
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("Incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Trailing bytes after frame: {0}")]
    TrailingBytes(usize),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

/// Encode an intent into a length-prefixed byte buffer
pub fn encode(intent: &Intent) -> Result<Bytes, CodecError> {
    let msg_len = intent.encoded_len();

    if msg_len > MAX_MESSAGE_SIZE as usize {
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(4 + msg_len);
    buf.put_u32(msg_len as u32);
    intent.encode(&mut buf)?;

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed intent from a buffer
///
/// Returns:
/// - `Ok(Some(intent))` if a complete message was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<Intent>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let msg_bytes = buf.split_to(msg_len as usize);

    Ok(Some(Intent::decode(msg_bytes)?))
}

/// Decode a buffer that must hold exactly one complete frame
pub fn decode_frame(frame: &[u8]) -> Result<Intent, CodecError> {
    let mut buf = BytesMut::from(frame);
    match decode(&mut buf)? {
        Some(intent) if buf.is_empty() => Ok(intent),
        Some(_) => Err(CodecError::TrailingBytes(buf.len())),
        None => {
            let needed = if frame.len() < 4 {
                4
            } else {
                4 + u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize
            };
            Err(CodecError::Incomplete {
                needed,
                available: frame.len(),
            })
        }
    }
}
