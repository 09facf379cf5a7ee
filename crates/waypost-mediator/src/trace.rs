//! Protocol trace log — ordered record of every raw payload the mediator
//! exchanged, tagged with the peer address. This is the observability
//! surface test harnesses use to assert exact protocol traces.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// One recorded payload.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub peer: SocketAddr,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct TraceLog {
    sent: Mutex<Vec<TraceEntry>>,
    received: Mutex<Vec<TraceEntry>>,
}

impl TraceLog {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_sent(&self, peer: SocketAddr, payload: Vec<u8>) {
        self.sent.lock().unwrap().push(TraceEntry { peer, payload });
    }

    pub(crate) fn record_received(&self, peer: SocketAddr, payload: Vec<u8>) {
        self.received
            .lock()
            .unwrap()
            .push(TraceEntry { peer, payload });
    }

    /// Every payload sent by the mediator, in send order across all
    /// connections.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.payload.clone())
            .collect()
    }

    /// Every payload received by the mediator, in receive order across all
    /// connections.
    pub fn received_messages(&self) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.payload.clone())
            .collect()
    }

    /// Payloads sent to one connection, in order.
    pub fn sent_to(&self, peer: SocketAddr) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.peer == peer)
            .map(|entry| entry.payload.clone())
            .collect()
    }

    /// Payloads received from one connection, in order.
    pub fn received_from(&self, peer: SocketAddr) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.peer == peer)
            .map(|entry| entry.payload.clone())
            .collect()
    }
}
