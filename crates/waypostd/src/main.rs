//! waypostd — Waypost rendezvous mediator daemon.

use std::sync::Arc;

use anyhow::Result;

use waypost_core::challenge::SealedBox;
use waypost_core::config::MediatorConfig;
use waypost_mediator::Mediator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = MediatorConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MediatorConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MediatorConfig::default()
    });
    tracing::info!(
        min_version = config.protocol.min_version,
        rendezvous_timeout_ms = config.protocol.rendezvous_timeout_ms,
        verify_proof = config.protocol.verify_proof,
        "waypostd starting"
    );

    let mediator = Mediator::bind(config, Arc::new(SealedBox)).await?;
    tracing::info!(addr = %mediator.local_addr(), "listening");
    mediator.start();

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    mediator.stop().await;

    Ok(())
}
