//! Waypost wire codec — JSON message bodies behind a length-prefixed frame.
//!
//! A frame on the wire is a 4-byte little-endian length followed by the
//! JSON body. The codec itself is pure; socket I/O lives with whoever owns
//! the connection. `decode_expected` is the protocol's main entry point:
//! each state of the handshake knows exactly which variant it will accept
//! next, and anything else is a protocol violation.

use serde::Deserialize;
use thiserror::Error;

use crate::message::{Message, MessageType};

/// Maximum frame body size. Advertise payloads carry two public keys and
/// nothing in the protocol grows beyond a few kilobytes; anything larger
/// is a violation, not a legitimate message.
pub const MAX_FRAME: usize = 64 * 1024;

/// Size of the length prefix preceding every frame body.
pub const FRAME_HEADER: usize = 4;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected {expected} but received {got}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },

    #[error("frame of {0} bytes exceeds the {MAX_FRAME} byte limit")]
    FrameTooLarge(usize),
}

/// Serialize a message to its wire body (without the length prefix).
/// Infallible for this closed type set — a serialization failure here is
/// a bug in the schema, not a runtime condition.
pub fn encode(message: &Message) -> Vec<u8> {
    serde_json::to_vec(message).expect("message serialization failed")
}

/// Decode a wire body into any protocol message.
pub fn decode(body: &[u8]) -> Result<Message, WireError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a wire body, rejecting well-formed messages of the wrong variant.
pub fn decode_expected(body: &[u8], expected: MessageType) -> Result<Message, WireError> {
    let message = decode(body)?;
    let got = message.message_type();
    if got != expected {
        return Err(WireError::UnexpectedType { expected, got });
    }
    Ok(message)
}

/// Read only the `type` tag of a wire body. Used for trace classification
/// without paying for (or trusting) the full payload decode.
pub fn peek_type(body: &[u8]) -> Result<MessageType, WireError> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(rename = "type")]
        message_type: MessageType,
    }
    let envelope: Envelope = serde_json::from_slice(body)?;
    Ok(envelope.message_type)
}

/// Validate a frame body length against [`MAX_FRAME`].
pub fn check_frame_len(len: usize) -> Result<(), WireError> {
    if len > MAX_FRAME {
        return Err(WireError::FrameTooLarge(len));
    }
    Ok(())
}
