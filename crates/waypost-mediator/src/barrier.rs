//! Disconnect barrier — orders peer identification after peer readiness.
//!
//! The second-arriving endpoint is told to disconnect and start listening
//! for the direct connection; only once that instruction has been sent
//! may its waiting peer learn the address. Without this barrier the first
//! endpoint could dial a peer that is still attached to the mediator and
//! not yet accepting connections.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::Notify;

/// Latched per-address readiness signals. Shared across all handlers for
/// the lifetime of the server.
#[derive(Default)]
pub struct DisconnectBarrier {
    ready: DashSet<SocketAddr>,
    signals: Notify,
}

impl DisconnectBarrier {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Latch a readiness signal for `addr` and wake every waiter. Calling
    /// this before anyone waits is fine — the signal is a latch, not a
    /// pulse.
    ///
    /// Retention: a latched signal persists until a [`wait_ready`]
    /// consumes it. If the would-be waiter already timed out of its
    /// rendezvous, nothing ever consumes the signal and the entry stays
    /// until shutdown; the barrier never evicts on its own.
    ///
    /// [`wait_ready`]: DisconnectBarrier::wait_ready
    pub fn signal_ready(&self, addr: SocketAddr) {
        self.ready.insert(addr);
        self.signals.notify_waiters();
    }

    /// Suspend until a readiness signal for `addr` has been posted, then
    /// atomically consume it. At most one waiter per address is expected
    /// per pairing; consumption keeps sequential pairings on the same
    /// address independent.
    pub async fn wait_ready(&self, addr: SocketAddr) {
        loop {
            let signalled = self.signals.notified();
            if self.ready.remove(&addr).is_some() {
                return;
            }
            signalled.await;
        }
    }

    /// Non-consuming peek, for tests and diagnostics.
    pub fn is_ready(&self, addr: SocketAddr) -> bool {
        self.ready.contains(&addr)
    }
}
