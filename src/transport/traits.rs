//! Transport trait abstraction for pluggable relay backends

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// A frame received from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame (not part of the relay protocol)
    Binary(Bytes),
    /// Ping frame with payload
    Ping(Bytes),
    /// Pong frame with payload
    Pong(Bytes),
    /// Close frame with status code and reason
    Close { code: u16, reason: String },
}

/// Write half of a relay session
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Send a text frame; resolves once the frame is flushed to the transport
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Send a keepalive ping
    async fn send_ping(&mut self) -> Result<()>;

    /// Close the session gracefully
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a relay session
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Receive the next frame, returning `None` when the stream ends
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

/// Factory for creating relay sessions
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// Write half produced by this connector
    type Writer: TransportWriter;
    /// Read half produced by this connector
    type Reader: TransportReader;

    /// Attempt to connect, returning split halves on success
    async fn connect(&self) -> Result<(Self::Writer, Self::Reader)>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
