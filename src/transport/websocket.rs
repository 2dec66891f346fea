//! WebSocket transport for the relay
//!
//! Thin wrapper around `tokio-tungstenite` providing split reader/writer halves
//! that implement the transport traits.

use crate::config::Endpoint;
use crate::transport::traits::{Frame, TransportConnector, TransportReader, TransportWriter};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a WebSocket session
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .context("WebSocket send_ping failed")
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a WebSocket session
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Binary(data)) => Frame::Binary(Bytes::from(data)),
                Ok(Message::Ping(data)) => Frame::Ping(Bytes::from(data)),
                Ok(Message::Pong(data)) => Frame::Pong(Bytes::from(data)),
                Ok(Message::Close(close_frame)) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    Frame::Close { code, reason }
                }
                // Raw frames are never produced while reading
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(anyhow!("WebSocket read error: {e}"))),
            };
            return Some(Ok(frame));
        }
    }
}

/// Connector for a relay WebSocket endpoint
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for a full `ws://` URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Create a connector for a relay endpoint
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self::new(endpoint.url())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    type Writer = WsWriter;
    type Reader = WsReader;

    async fn connect(&self) -> Result<(Self::Writer, Self::Reader)> {
        debug!("Connecting to relay at {}", self.url);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .with_context(|| format!("WebSocket connect to {} failed", self.url))?;

        let (sink, stream) = ws_stream.split();
        Ok((WsWriter { sink }, WsReader { stream }))
    }

    fn name(&self) -> &'static str {
        "WebSocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackRelay;

    #[test]
    fn test_connector_url_from_endpoint() {
        let endpoint = Endpoint {
            host: "192.168.1.20".into(),
            port: 81,
            path: Some("/ir".into()),
        };
        let connector = WebSocketConnector::for_endpoint(&endpoint);
        assert_eq!(connector.url(), "ws://192.168.1.20:81/ir");
        assert_eq!(connector.name(), "WebSocket");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = WebSocketConnector::new(format!("ws://127.0.0.1:{port}/"));
        assert!(connector.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_text_frames_both_ways() {
        let mut relay = LoopbackRelay::start().await;
        let connector = WebSocketConnector::new(relay.url("relay"));

        let (mut writer, mut reader) = connector.connect().await.unwrap();
        let peer = relay.accept().await;
        assert_eq!(peer.path, "/relay");

        writer.send_text("IR-SEND:NEC;A1B2").await.unwrap();
        assert_eq!(relay.next_text().await.as_deref(), Some("IR-SEND:NEC;A1B2"));

        relay.push_text("POWER_STATE;on");
        let frame = reader.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Text("POWER_STATE;on".into()));

        relay.push_binary(vec![1, 2, 3]);
        let frame = reader.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Binary(Bytes::from_static(&[1, 2, 3])));
    }

    #[tokio::test]
    async fn test_server_close_is_reported() {
        let mut relay = LoopbackRelay::start().await;
        let connector = WebSocketConnector::new(relay.url(""));

        let (_writer, mut reader) = connector.connect().await.unwrap();
        relay.accept().await;
        relay.close_current();

        match reader.recv().await {
            Some(Ok(Frame::Close { code, .. })) => assert_eq!(code, 1000),
            None => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
