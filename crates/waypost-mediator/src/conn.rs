//! Framed connection — the transport seam between a handler and its
//! endpoint. Every send and receive is logged with direction, peer
//! address, and raw payload, and appended to the shared trace log.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use waypost_core::message::{Message, MessageType};
use waypost_core::wire;

use crate::handler::HandlerError;
use crate::trace::TraceLog;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    trace: Arc<TraceLog>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, trace: Arc<TraceLog>) -> Self {
        Self {
            stream,
            peer,
            trace,
        }
    }

    /// The endpoint's externally visible address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Encode and send one message frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), HandlerError> {
        let payload = wire::encode(message);
        wire::check_frame_len(payload.len())?;
        self.stream.write_u32_le(payload.len() as u32).await?;
        self.stream.write_all(&payload).await?;

        tracing::debug!(
            peer = %self.peer,
            message_type = %message.message_type(),
            body = %String::from_utf8_lossy(&payload),
            "sent"
        );
        self.trace.record_sent(self.peer, payload);
        Ok(())
    }

    /// Receive one frame and decode it as the expected variant. A frame of
    /// any other variant, or a malformed body, is a protocol violation.
    pub async fn receive(&mut self, expected: MessageType) -> Result<Message, HandlerError> {
        let len = self.stream.read_u32_le().await? as usize;
        wire::check_frame_len(len)?;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;

        tracing::debug!(
            peer = %self.peer,
            message_type = %wire::peek_type(&payload).map(|t| t.as_str()).unwrap_or("<malformed>"),
            body = %String::from_utf8_lossy(&payload),
            "received"
        );
        // Recorded before decoding so violations still appear in the trace.
        let message = wire::decode_expected(&payload, expected);
        self.trace.record_received(self.peer, payload);
        Ok(message?)
    }

    /// Flush and shut down the write half.
    pub async fn close(mut self) -> Result<(), HandlerError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
