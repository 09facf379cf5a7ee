//! Waypost integration test harness.
//!
//! Each test runs a real mediator on an OS-assigned loopback port and
//! drives it with framed TCP clients acting as endpoints. The mediator's
//! trace log is used to assert exact protocol sequences.

use std::net::SocketAddr;

use anyhow::{bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub use std::sync::Arc;

pub use anyhow::Result;
pub use waypost_core::challenge::{Keypair, SealedBox};
pub use waypost_core::config::MediatorConfig;
pub use waypost_core::message::{Message, MessageType, PairingKey, PROTOCOL_VERSION};
pub use waypost_core::wire;
pub use waypost_mediator::Mediator;

mod rendezvous;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Bind and start a mediator on a loopback port, with config tweaks.
pub async fn start_mediator(configure: impl FnOnce(&mut MediatorConfig)) -> Result<Mediator> {
    let mut config = MediatorConfig::default();
    configure(&mut config);
    let mediator = Mediator::bind(config, Arc::new(SealedBox)).await?;
    mediator.start();
    Ok(mediator)
}

/// A test endpoint: a framed TCP client with its own X25519 keypair,
/// whose public half doubles as its pairing key.
pub struct Endpoint {
    stream: TcpStream,
    pub keypair: Keypair,
    pub local_addr: SocketAddr,
}

impl Endpoint {
    pub async fn connect(mediator: SocketAddr) -> Result<Self> {
        Self::connect_with_keypair(mediator, Keypair::generate()).await
    }

    /// Connect with a pre-generated keypair, so a peer can advertise this
    /// endpoint's pairing key before the endpoint itself connects.
    pub async fn connect_with_keypair(mediator: SocketAddr, keypair: Keypair) -> Result<Self> {
        let stream = TcpStream::connect(mediator)
            .await
            .context("failed to connect to mediator")?;
        let local_addr = stream.local_addr()?;
        Ok(Self {
            stream,
            keypair,
            local_addr,
        })
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn pairing_key(&self) -> PairingKey {
        PairingKey::from(self.keypair.public)
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let payload = wire::encode(message);
        self.stream.write_u32_le(payload.len() as u32).await?;
        self.stream.write_all(&payload).await?;
        Ok(())
    }

    pub async fn receive(&mut self) -> Result<Message> {
        let len = self.stream.read_u32_le().await? as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(wire::decode(&payload)?)
    }

    pub async fn receive_expected(&mut self, expected: MessageType) -> Result<Message> {
        let message = self.receive().await?;
        if message.message_type() != expected {
            bail!("expected {expected}, got {}", message.message_type());
        }
        Ok(message)
    }

    pub async fn advertise(&mut self, version: u32, peer_key: &PairingKey) -> Result<()> {
        self.send(&Message::Advertise {
            version,
            own_key: self.pairing_key(),
            peer_key: peer_key.clone(),
        })
        .await
    }

    /// Receive the challenge, open it with our private key, and echo the
    /// recovered nonce as the proof. Returns the nonce.
    pub async fn answer_challenge(&mut self) -> Result<Vec<u8>> {
        let Message::AdvertiseChallenge { encrypted_nonce } =
            self.receive_expected(MessageType::AdvertiseChallenge).await?
        else {
            unreachable!()
        };
        let nonce = SealedBox::open(&self.keypair, &encrypted_nonce)
            .context("failed to open challenge")?;
        self.send(&Message::AdvertiseResponse {
            proof: nonce.clone(),
        })
        .await?;
        Ok(nonce)
    }

    /// Assert the mediator has closed this connection.
    pub async fn expect_closed(&mut self) -> Result<()> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf).await {
            Ok(0) => Ok(()),
            Ok(n) => bail!("expected close, got {n} more bytes"),
            // A reset is also a close from the protocol's point of view.
            Err(_) => Ok(()),
        }
    }
}

/// Message types of a raw payload sequence, for trace assertions.
pub fn types_of(payloads: &[Vec<u8>]) -> Vec<MessageType> {
    payloads
        .iter()
        .map(|p| wire::peek_type(p).expect("trace payload should be well-formed"))
        .collect()
}
