//! Connection handler — the per-connection protocol state machine.
//!
//! One handler runs per accepted connection, on its own task:
//!
//!   AwaitAdvertise → Challenge → AwaitResponse → Correlate
//!
//! At Correlate the handler learns its role. The first arrival of a
//! pairing registers itself and suspends until its peer shows up (bounded
//! by the rendezvous timeout). The second arrival registers itself, tells
//! its endpoint to disconnect and listen, and signals readiness — only
//! then does the first arrival's handler send the PeerIdentification.
//! That ordering is the disconnect barrier's entire purpose: the dialing
//! endpoint must never learn an address before its peer is accepting.

use std::sync::Arc;

use thiserror::Error;

use waypost_core::challenge::{self, ChallengeCipher, ChallengeError, VerifyPolicy};
use waypost_core::config::ProtocolConfig;
use waypost_core::message::{Message, MessageType, PairingKey};
use waypost_core::wire::WireError;

use crate::barrier::DisconnectBarrier;
use crate::conn::Connection;
use crate::store::{CorrelationStore, PeerIdentity};

/// Shared per-server state handed to every handler.
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub store: Arc<CorrelationStore>,
    pub barrier: Arc<DisconnectBarrier>,
    pub cipher: Arc<dyn ChallengeCipher>,
    pub protocol: ProtocolConfig,
}

impl HandlerContext {
    fn verify_policy(&self) -> VerifyPolicy {
        if self.protocol.verify_proof {
            VerifyPolicy::NonceEcho
        } else {
            VerifyPolicy::None
        }
    }
}

/// How a handler's protocol run ended. Errors terminate the connection
/// without an outcome; all three outcomes are clean protocol exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The pairing completed (either role).
    Completed,
    /// The endpoint was rejected with an AdvertiseAbort.
    Aborted,
    /// The peer never advertised within the rendezvous window.
    TimedOut,
}

/// Errors local to one connection. These never escape to other handlers
/// or to the server — they terminate only the owning connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("challenge failed: {0}")]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("challenge proof does not match the issued nonce")]
    ProofMismatch,
}

/// Run the protocol for one accepted connection, start to finish.
pub(crate) async fn handle_connection(
    mut conn: Connection,
    ctx: HandlerContext,
) -> Result<HandlerOutcome, HandlerError> {
    // AwaitAdvertise
    let Message::Advertise {
        version,
        own_key,
        peer_key,
    } = conn.receive(MessageType::Advertise).await?
    else {
        unreachable!("decode_expected returned a non-Advertise message")
    };

    if version < ctx.protocol.min_version {
        tracing::error!(
            peer = %conn.peer_addr(),
            version,
            min_version = ctx.protocol.min_version,
            "unsupported protocol version"
        );
        let reason = format!("required protocol version: {}", ctx.protocol.min_version);
        conn.send(&Message::AdvertiseAbort { reason }).await?;
        conn.close().await?;
        return Ok(HandlerOutcome::Aborted);
    }

    // Challenge — prove the endpoint holds the private half of own_key.
    let nonce = challenge::generate_nonce();
    let encrypted_nonce = ctx.cipher.encrypt_for(own_key.as_bytes(), &nonce)?;
    conn.send(&Message::AdvertiseChallenge { encrypted_nonce })
        .await?;

    // AwaitResponse
    let Message::AdvertiseResponse { proof } =
        conn.receive(MessageType::AdvertiseResponse).await?
    else {
        unreachable!("decode_expected returned a non-AdvertiseResponse message")
    };
    if !ctx.verify_policy().accepts(&nonce, &proof) {
        tracing::error!(peer = %conn.peer_addr(), "challenge proof rejected");
        return Err(HandlerError::ProofMismatch);
    }

    // Correlate
    let identity = PeerIdentity::new(conn.peer_addr(), version);
    match ctx.store.get(&peer_key) {
        None => first_role(conn, ctx, identity, own_key, peer_key).await,
        Some(waiting) => second_role(conn, ctx, identity, own_key, peer_key, waiting).await,
    }
}

/// First arrival: register, wait for the peer, then — once the peer has
/// signalled readiness — hand over its address.
async fn first_role(
    mut conn: Connection,
    ctx: HandlerContext,
    identity: PeerIdentity,
    own_key: PairingKey,
    peer_key: PairingKey,
) -> Result<HandlerOutcome, HandlerError> {
    ctx.store.put(own_key, identity);
    tracing::debug!(
        peer = %conn.peer_addr(),
        pairing = %peer_key,
        "registered first endpoint, awaiting its peer"
    );

    let Some(peer) = ctx
        .store
        .await_peer(&peer_key, ctx.protocol.rendezvous_timeout())
        .await
    else {
        // Silent failure from the endpoint's perspective — the peer never
        // arrived, and the protocol defines no message for that.
        tracing::error!(
            peer = %conn.peer_addr(),
            pairing = %peer_key,
            "peer never advertised within the rendezvous window"
        );
        conn.close().await?;
        return Ok(HandlerOutcome::TimedOut);
    };
    if ctx.protocol.evict_on_consume {
        ctx.store.remove(&peer_key);
    }

    // The peer must have received its PeerDisconnect before we reveal its
    // address, otherwise it may not yet be listening for the direct
    // connection.
    ctx.barrier.wait_ready(peer.addr).await;

    conn.send(&Message::PeerIdentification {
        version: peer.version,
        host: peer.addr.ip().to_string(),
        port: peer.addr.port(),
    })
    .await?;
    conn.close().await?;
    Ok(HandlerOutcome::Completed)
}

/// Second arrival: register symmetrically, instruct the endpoint to
/// disconnect and listen, and signal readiness to the waiting handler.
async fn second_role(
    mut conn: Connection,
    ctx: HandlerContext,
    identity: PeerIdentity,
    own_key: PairingKey,
    peer_key: PairingKey,
    waiting: PeerIdentity,
) -> Result<HandlerOutcome, HandlerError> {
    ctx.store.put(own_key, identity);
    if ctx.protocol.evict_on_consume {
        ctx.store.remove(&peer_key);
    }
    tracing::debug!(
        peer = %conn.peer_addr(),
        waiting = %waiting.addr,
        "second endpoint registered, completing pairing"
    );

    let port = conn.peer_addr().port();
    conn.send(&Message::PeerDisconnect { port }).await?;
    ctx.barrier.signal_ready(conn.peer_addr());

    conn.close().await?;
    Ok(HandlerOutcome::Completed)
}
