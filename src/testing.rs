//! Test doubles: a scripted in-memory transport and a loopback WebSocket relay

use crate::transport::{Frame, TransportConnector, TransportReader, TransportWriter};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// What the next connect attempt does
#[derive(Debug, Clone, Copy)]
pub(crate) enum ConnectOutcome {
    Accept,
    Refuse,
    /// Never completes; exercises the connect timeout
    Hang,
}

/// Test-side handle to one accepted in-memory session
pub(crate) struct MockSession {
    frames_tx: mpsc::UnboundedSender<Result<Frame>>,
    pub sent_rx: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
}

impl MockSession {
    pub fn push_text(&self, text: &str) {
        let _ = self.frames_tx.send(Ok(Frame::Text(text.to_string())));
    }

    pub fn push_frame(&self, frame: Frame) {
        let _ = self.frames_tx.send(Ok(frame));
    }

    pub fn push_error(&self, message: &str) {
        let _ = self.frames_tx.send(Err(anyhow!(message.to_string())));
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }
}

/// Counts sessions whose halves are still alive
struct LiveToken {
    live: Arc<AtomicUsize>,
}

impl LiveToken {
    fn new(live: Arc<AtomicUsize>, max_live: &AtomicUsize) -> Self {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        max_live.fetch_max(now, Ordering::SeqCst);
        Self { live }
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockWriter {
    sent_tx: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
    _token: Arc<LiveToken>,
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("broken pipe"));
        }
        let _ = self.sent_tx.send(text.to_string());
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("broken pipe"));
        }
        let _ = self.sent_tx.send("<ping>".to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.sent_tx.send("<close>".to_string());
        Ok(())
    }
}

pub(crate) struct MockReader {
    frames_rx: mpsc::UnboundedReceiver<Result<Frame>>,
    _token: Arc<LiveToken>,
}

#[async_trait]
impl TransportReader for MockReader {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.frames_rx.recv().await
    }
}

/// In-memory connector driven by a script of connect outcomes.
/// Once the script runs out every attempt is refused.
#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<ConnectOutcome>>>,
    attempts: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    sessions_tx: mpsc::UnboundedSender<MockSession>,
}

impl ScriptedConnector {
    pub fn new(
        script: impl IntoIterator<Item = ConnectOutcome>,
    ) -> (Self, mpsc::UnboundedReceiver<MockSession>) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            attempts: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            sessions_tx,
        };
        (connector, sessions_rx)
    }

    /// A connector whose every attempt is refused
    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<MockSession>) {
        Self::new(Vec::<ConnectOutcome>::new())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_sessions(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    type Writer = MockWriter;
    type Reader = MockReader;

    async fn connect(&self) -> Result<(Self::Writer, Self::Reader)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectOutcome::Refuse);

        match outcome {
            ConnectOutcome::Refuse => Err(anyhow!("connection refused")),
            ConnectOutcome::Hang => std::future::pending().await,
            ConnectOutcome::Accept => {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let fail_sends = Arc::new(AtomicBool::new(false));
                let token = Arc::new(LiveToken::new(self.live.clone(), &self.max_live));

                let _ = self.sessions_tx.send(MockSession {
                    frames_tx,
                    sent_rx,
                    fail_sends: fail_sends.clone(),
                });

                Ok((
                    MockWriter {
                        sent_tx,
                        fail_sends,
                        _token: token.clone(),
                    },
                    MockReader {
                        frames_rx,
                        _token: token,
                    },
                ))
            }
        }
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}

enum RelayControl {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// A peer accepted by the loopback relay
#[derive(Debug)]
pub(crate) struct AcceptedPeer {
    pub path: String,
}

/// Real WebSocket server on 127.0.0.1 for end-to-end tests
pub(crate) struct LoopbackRelay {
    addr: SocketAddr,
    peers_rx: mpsc::UnboundedReceiver<AcceptedPeer>,
    texts_rx: mpsc::UnboundedReceiver<String>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<RelayControl>>>>,
}

impl LoopbackRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let (texts_tx, texts_rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));

        let current_clone = current.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let path = Arc::new(Mutex::new(String::new()));
                let path_clone = path.clone();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *path_clone.lock().unwrap() = req.uri().path().to_string();
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let (control_tx, mut control_rx) = mpsc::unbounded_channel();
                *current_clone.lock().unwrap() = Some(control_tx);
                let path = path.lock().unwrap().clone();
                let _ = peers_tx.send(AcceptedPeer { path });

                let texts_tx = texts_tx.clone();
                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = texts_tx.send(text);
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            control = control_rx.recv() => match control {
                                Some(RelayControl::Text(text)) => {
                                    let _ = sink.send(Message::Text(text)).await;
                                }
                                Some(RelayControl::Binary(data)) => {
                                    let _ = sink.send(Message::Binary(data)).await;
                                }
                                Some(RelayControl::Close) | None => {
                                    let _ = sink
                                        .send(Message::Close(Some(CloseFrame {
                                            code: CloseCode::Normal,
                                            reason: "bye".into(),
                                        })))
                                        .await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            peers_rx,
            texts_rx,
            current,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}/{}", self.addr, path)
    }

    /// Wait for the next client to complete the handshake
    pub async fn accept(&mut self) -> AcceptedPeer {
        self.peers_rx.recv().await.unwrap()
    }

    /// Next text frame received from any client
    pub async fn next_text(&mut self) -> Option<String> {
        self.texts_rx.recv().await
    }

    fn control(&self, control: RelayControl) {
        if let Some(tx) = self.current.lock().unwrap().as_ref() {
            let _ = tx.send(control);
        }
    }

    pub fn push_text(&self, text: &str) {
        self.control(RelayControl::Text(text.to_string()));
    }

    pub fn push_binary(&self, data: Vec<u8>) {
        self.control(RelayControl::Binary(data));
    }

    pub fn close_current(&self) {
        self.control(RelayControl::Close);
    }
}
