//! waypost-mediator — the rendezvous mediation library.
//!
//! Two endpoints that share a pairing secret connect to the mediator; it
//! challenges each, correlates the pair through the [`store`], orders
//! their teardown through the [`barrier`], and hands the first arrival
//! its peer's externally visible address. The mediator never relays
//! application traffic and keeps no state across restarts.

pub mod barrier;
pub mod conn;
pub mod handler;
pub mod server;
pub mod store;
pub mod trace;

pub use barrier::DisconnectBarrier;
pub use handler::{HandlerError, HandlerOutcome};
pub use server::Mediator;
pub use store::{CorrelationStore, PeerIdentity};
pub use trace::TraceLog;
