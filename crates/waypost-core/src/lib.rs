//! waypost-core — shared protocol types, wire codec, and challenge crypto.
//! All other Waypost crates depend on this one.

pub mod challenge;
pub mod config;
pub mod message;
pub mod wire;

pub use message::{Message, MessageType, PairingKey, PROTOCOL_VERSION};
