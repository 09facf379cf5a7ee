//! Correlation store — the rendezvous point between paired connections.
//!
//! The first endpoint of a pairing to finish its challenge registers
//! itself here and suspends on [`CorrelationStore::await_peer`] until the
//! second endpoint's registration appears (or a timeout elapses). The
//! wait suspends only the calling handler task, never the accept loop or
//! unrelated handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use waypost_core::message::PairingKey;

/// An endpoint once its Advertise has been accepted: the externally
/// visible address the mediator saw it connect from, plus the protocol
/// version it speaks. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub addr: SocketAddr,
    pub version: u32,
}

impl PeerIdentity {
    pub fn new(addr: SocketAddr, version: u32) -> Self {
        Self { addr, version }
    }
}

/// Concurrent pairing-key → identity map with blocking-with-timeout
/// lookup. Shared by every connection handler for the lifetime of the
/// server.
#[derive(Default)]
pub struct CorrelationStore {
    entries: DashMap<PairingKey, PeerIdentity>,
    arrivals: Notify,
}

impl CorrelationStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or overwrite the entry for `key` and wake every waiter.
    /// Never blocks.
    pub fn put(&self, key: PairingKey, identity: PeerIdentity) {
        self.entries.insert(key, identity);
        self.arrivals.notify_waiters();
    }

    /// Non-blocking lookup.
    pub fn get(&self, key: &PairingKey) -> Option<PeerIdentity> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Explicit eviction. Whether consumed entries are removed is policy,
    /// not a side effect — see the `evict_on_consume` setting.
    pub fn remove(&self, key: &PairingKey) -> Option<PeerIdentity> {
        self.entries.remove(key).map(|(_, identity)| identity)
    }

    /// Suspend until an entry for `key` exists or `timeout` elapses.
    ///
    /// The notified future is registered before every map check, so a
    /// `put` racing with this wait at any point — including immediately
    /// before the first check — is still observed. No missed wakeup.
    pub async fn await_peer(&self, key: &PairingKey, timeout: Duration) -> Option<PeerIdentity> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let arrived = self.arrivals.notified();
            if let Some(identity) = self.get(key) {
                return Some(identity);
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                // Deadline passed; one final check covers a put that raced
                // with the timeout itself.
                return self.get(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
