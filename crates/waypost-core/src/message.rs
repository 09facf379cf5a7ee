//! Protocol message schema for the rendezvous mediation handshake.
//!
//! Six message variants cover the whole exchange: an endpoint advertises
//! itself, the mediator challenges it, the endpoint responds, and the
//! mediator closes the pairing with either a disconnect instruction or a
//! peer identification. Messages are immutable once constructed and are
//! never mutated after being sent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current protocol version. Endpoints advertising anything below the
/// mediator's configured minimum are aborted.
pub const PROTOCOL_VERSION: u32 = 1;

/// Opaque pairing token — a public key both endpoints of a pairing agree
/// on out-of-band. The mediator uses it purely for correlation and never
/// interprets it cryptographically (only the challenge step treats it as
/// key material).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingKey(Vec<u8>);

impl PairingKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for PairingKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<[u8; 32]> for PairingKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairingKey({})", hex::encode(&self.0))
    }
}

/// Message type discriminator. Serialized as the envelope's `type` tag,
/// so a trace can be classified without decoding the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Advertise,
    AdvertiseAbort,
    AdvertiseChallenge,
    AdvertiseResponse,
    PeerIdentification,
    PeerDisconnect,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advertise => "Advertise",
            Self::AdvertiseAbort => "AdvertiseAbort",
            Self::AdvertiseChallenge => "AdvertiseChallenge",
            Self::AdvertiseResponse => "AdvertiseResponse",
            Self::PeerIdentification => "PeerIdentification",
            Self::PeerDisconnect => "PeerDisconnect",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol message variants.
///
/// On the wire each message is a JSON object `{"type": ..., "payload": ...}`
/// where the tag matches the variant name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Endpoint announces itself: its own public key (so the mediator can
    /// challenge it) and the key of the peer it wants to reach.
    Advertise {
        version: u32,
        own_key: PairingKey,
        peer_key: PairingKey,
    },

    /// Fatal rejection of an Advertise, e.g. unsupported protocol version.
    AdvertiseAbort { reason: String },

    /// A nonce encrypted to the endpoint's advertised public key.
    AdvertiseChallenge { encrypted_nonce: Vec<u8> },

    /// The endpoint's proof of key possession (the decrypted nonce).
    AdvertiseResponse { proof: Vec<u8> },

    /// The waiting endpoint learns its peer's externally visible address.
    PeerIdentification {
        version: u32,
        host: String,
        port: u16,
    },

    /// Instructs the second-arriving endpoint to close its mediator
    /// connection and start listening for the direct connection.
    PeerDisconnect { port: u16 },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Advertise { .. } => MessageType::Advertise,
            Self::AdvertiseAbort { .. } => MessageType::AdvertiseAbort,
            Self::AdvertiseChallenge { .. } => MessageType::AdvertiseChallenge,
            Self::AdvertiseResponse { .. } => MessageType::AdvertiseResponse,
            Self::PeerIdentification { .. } => MessageType::PeerIdentification,
            Self::PeerDisconnect { .. } => MessageType::PeerDisconnect,
        }
    }
}
