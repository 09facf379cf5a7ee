//! Mediator server — accept loop, handler dispatch, and lifecycle.
//!
//! `bind` opens the listening socket, `start` spawns the accept loop, and
//! `stop` signals shutdown, closes the listener, and drains in-flight
//! handlers to natural completion. Double-start and stop-while-stopped
//! are caller defects and fail an assertion rather than being absorbed.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use waypost_core::challenge::ChallengeCipher;
use waypost_core::config::MediatorConfig;

use crate::barrier::DisconnectBarrier;
use crate::conn::Connection;
use crate::handler::{self, HandlerContext};
use crate::store::CorrelationStore;
use crate::trace::TraceLog;

type HandlerPool = Arc<AsyncMutex<Vec<JoinHandle<()>>>>;

struct Running {
    shutdown: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
    handlers: HandlerPool,
}

pub struct Mediator {
    config: MediatorConfig,
    cipher: Arc<dyn ChallengeCipher>,
    store: Arc<CorrelationStore>,
    barrier: Arc<DisconnectBarrier>,
    trace: Arc<TraceLog>,
    local_addr: SocketAddr,
    // Taken by start(); the mediator is not restartable.
    listener: Mutex<Option<TcpListener>>,
    running: Mutex<Option<Running>>,
}

impl Mediator {
    /// Bind the listening socket. Port 0 requests an OS-assigned port;
    /// the effective address is available via [`Mediator::local_addr`].
    pub async fn bind(config: MediatorConfig, cipher: Arc<dyn ChallengeCipher>) -> Result<Self> {
        let listener =
            TcpListener::bind((config.network.listen_addr.as_str(), config.network.port))
                .await
                .with_context(|| {
                    format!(
                        "failed to bind {}:{}",
                        config.network.listen_addr, config.network.port
                    )
                })?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound address")?;

        Ok(Self {
            config,
            cipher,
            store: CorrelationStore::shared(),
            barrier: DisconnectBarrier::shared(),
            trace: TraceLog::shared(),
            local_addr,
            listener: Mutex::new(Some(listener)),
            running: Mutex::new(None),
        })
    }

    /// The address endpoints should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared correlation store. Lives exactly as long as the server.
    pub fn store(&self) -> Arc<CorrelationStore> {
        self.store.clone()
    }

    /// The shared disconnect barrier. Lives exactly as long as the server.
    pub fn barrier(&self) -> Arc<DisconnectBarrier> {
        self.barrier.clone()
    }

    /// The protocol trace log, for test assertions.
    pub fn trace(&self) -> Arc<TraceLog> {
        self.trace.clone()
    }

    /// Current size of the handler pool. Completed handles are pruned as
    /// new connections arrive, so this tracks live connections rather
    /// than growing with every connection ever accepted. Zero when not
    /// running.
    pub async fn handler_pool_size(&self) -> usize {
        let handlers = self
            .running
            .lock()
            .unwrap()
            .as_ref()
            .map(|running| running.handlers.clone());
        match handlers {
            Some(pool) => pool.lock().await.len(),
            None => 0,
        }
    }

    /// Spawn the accept loop. Each accepted connection gets its own
    /// handler task. Panics if the mediator is already running.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap();
        assert!(running.is_none(), "mediator is already running");
        let listener = self
            .listener
            .lock()
            .unwrap()
            .take()
            .expect("mediator cannot be restarted after stop");

        let ctx = HandlerContext {
            store: self.store.clone(),
            barrier: self.barrier.clone(),
            cipher: self.cipher.clone(),
            protocol: self.config.protocol.clone(),
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handlers: HandlerPool = Arc::new(AsyncMutex::new(Vec::new()));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            ctx,
            self.trace.clone(),
            shutdown_rx,
            handlers.clone(),
        ));
        tracing::info!(addr = %self.local_addr, "mediator started");

        *running = Some(Running {
            shutdown: shutdown_tx,
            accept_task,
            handlers,
        });
    }

    /// Signal the accept loop to exit, close the listening socket, and
    /// wait for every in-flight handler to finish. Panics if the mediator
    /// is not running.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap()
            .take()
            .expect("mediator is not running");

        let _ = running.shutdown.send(());
        if let Err(e) = running.accept_task.await {
            tracing::warn!(error = %e, "accept loop task failed");
        }

        // Graceful drain — handlers run to natural completion, no abort.
        let handles = std::mem::take(&mut *running.handlers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "handler task panicked");
            }
        }
        tracing::info!("mediator stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: HandlerContext,
    trace: Arc<TraceLog>,
    mut shutdown: broadcast::Receiver<()>,
    handlers: HandlerPool,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("accept loop shutting down");
                return;
            }

            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        // One failed accept must not take the server down.
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                tracing::debug!(peer = %peer, "accepted connection");

                let conn = Connection::new(stream, peer, trace.clone());
                let ctx = ctx.clone();
                let handle = tokio::spawn(async move {
                    match handler::handle_connection(conn, ctx).await {
                        Ok(outcome) => {
                            tracing::debug!(peer = %peer, ?outcome, "connection finished");
                        }
                        Err(e) => {
                            // Isolated to this connection by design.
                            tracing::warn!(peer = %peer, error = %e, "connection failed");
                        }
                    }
                });
                let mut pool = handlers.lock().await;
                // Drop completed handles so the pool stays bounded by the
                // number of live connections, not the connection count.
                pool.retain(|h| !h.is_finished());
                pool.push(handle);
            }
        }
    }
}
