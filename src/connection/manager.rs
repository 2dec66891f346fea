//! Connection manager with a persistent relay session and automatic reconnection

use crate::config::{ChannelConfig, SendPolicy};
use crate::error::ChannelError;
use crate::listener::ListenerRegistry;
use crate::transport::{Frame, TransportConnector, TransportReader, TransportWriter};
use irtv_shared::state_machine::{
    is_valid_transition, ChannelEvent, ConnectionState, ConnectionStateMachine, TransitionResult,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Capacity of the outbound command queue
const OUTBOUND_QUEUE: usize = 100;

/// Capacity of the queue feeding the dispatch task. Messages arriving while it is full are dropped.
const INBOUND_QUEUE: usize = 100;

/// Capacity of the lifecycle event channel
const EVENT_QUEUE: usize = 16;

/// Lifecycle events published by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Session established
    Connected { transport: &'static str },
    /// A live session ended
    Disconnected { reason: String },
    /// A connect attempt failed
    ConnectionFailed { reason: String },
}

/// A command waiting to be written
struct Outbound {
    text: String,
    reply: oneshot::Sender<Result<(), ChannelError>>,
}

/// Why a connect attempt or session ended
enum SessionEnd {
    Shutdown,
    Closed(String),
    Failed(String),
    ConnectFailed(String),
}

/// Handles of a running connection loop
struct Running {
    outbound_tx: mpsc::Sender<Outbound>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the relay session and keeps it alive.
///
/// Exactly one task drives the connection; it holds the only session handle,
/// so at most one session is ever live. Commands and inbound messages cross
/// into and out of that task through channels.
pub struct ConnectionManager<C: TransportConnector> {
    connector: Arc<C>,
    config: ChannelConfig,
    listeners: Arc<ListenerRegistry>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    running: Mutex<Option<Running>>,
}

impl<C: TransportConnector> ConnectionManager<C> {
    /// Create a connection manager. Nothing connects until [`start`](Self::start).
    pub fn new(connector: C, config: ChannelConfig, listeners: Arc<ListenerRegistry>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_QUEUE);

        Self {
            connector: Arc::new(connector),
            config,
            listeners,
            state_tx: Arc::new(state_tx),
            event_tx,
            running: Mutex::new(None),
        }
    }

    /// Start the connection loop. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                debug!("Connection loop already running, ignoring start");
                return false;
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

        tokio::spawn(dispatch_loop(self.listeners.clone(), inbound_rx));

        let connection = ConnectionLoop {
            connector: self.connector.clone(),
            config: self.config.clone(),
            fsm: ConnectionStateMachine::new(),
            state_tx: self.state_tx.clone(),
            event_tx: self.event_tx.clone(),
            inbound_tx,
            outbound_rx,
            shutdown_rx,
            deferred: Vec::new(),
        };

        info!("Starting relay connection via {}", self.connector.name());
        let task = tokio::spawn(connection.run());

        *running = Some(Running {
            outbound_tx,
            shutdown_tx,
            task,
        });
        true
    }

    /// Tear down the session, cancel any pending reconnect and wait for the loop to exit
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.task.await {
            error!("Connection task ended abnormally: {}", e);
        }
        info!("Relay connection stopped");
    }

    /// Whether the connection loop is running
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Hand an encoded message to the connection task and wait for the write outcome
    pub async fn submit(&self, text: String) -> Result<(), ChannelError> {
        let outbound_tx = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.outbound_tx.clone())
            .ok_or(ChannelError::NotConnected)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        outbound_tx
            .send(Outbound {
                text,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChannelError::NotConnected)?;

        reply_rx.await.unwrap_or(Err(ChannelError::NotConnected))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Receive lifecycle events
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }
}

/// Deliver inbound messages to listeners, in arrival order, off the connection task
async fn dispatch_loop(
    listeners: Arc<ListenerRegistry>,
    mut inbound_rx: mpsc::Receiver<String>,
) {
    while let Some(raw) = inbound_rx.recv().await {
        listeners.dispatch(&raw);
    }
}

/// State owned by the connection task
struct ConnectionLoop<C: TransportConnector> {
    connector: Arc<C>,
    config: ChannelConfig,
    fsm: ConnectionStateMachine,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    inbound_tx: mpsc::Sender<String>,
    outbound_rx: mpsc::Receiver<Outbound>,
    shutdown_rx: watch::Receiver<bool>,
    /// Commands held for the outcome of the next connect attempt
    deferred: Vec<Outbound>,
}

impl<C: TransportConnector> ConnectionLoop<C> {
    /// Main connection loop with reconnection logic
    async fn run(mut self) {
        let mut reconnect_delay = self.config.reconnect_delay;

        loop {
            self.transition(ChannelEvent::ConnectStarted);

            let connector = self.connector.clone();
            let connect = timeout(self.config.connect_timeout, connector.connect());
            tokio::pin!(connect);

            let outcome = loop {
                tokio::select! {
                    result = &mut connect => break Some(result),
                    _ = self.shutdown_rx.changed() => break None,
                    Some(outbound) = self.outbound_rx.recv() => self.hold_or_reject(outbound),
                }
            };
            let Some(outcome) = outcome else {
                break;
            };

            let end = match outcome {
                Ok(Ok((writer, reader))) => {
                    info!("Socket connection established via {}", connector.name());
                    self.transition(ChannelEvent::Opened);
                    self.emit(ConnectionEvent::Connected {
                        transport: connector.name(),
                    });
                    reconnect_delay = self.config.reconnect_delay;

                    self.run_session(writer, reader).await
                }
                Ok(Err(e)) => SessionEnd::ConnectFailed(format!("{e:#}")),
                Err(_) => SessionEnd::ConnectFailed(format!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout
                )),
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Closed(reason) => {
                    info!("Socket connection closed by server: {}", reason);
                    self.transition(ChannelEvent::RemoteClosed);
                    self.emit(ConnectionEvent::Disconnected { reason });
                    // Server-initiated close reconnects without backoff
                    continue;
                }
                SessionEnd::Failed(reason) => {
                    error!("Socket connection error: {}", reason);
                    self.transition(ChannelEvent::Failed);
                    self.emit(ConnectionEvent::Disconnected { reason });
                }
                SessionEnd::ConnectFailed(reason) => {
                    error!("Socket connection failed: {}", reason);
                    self.transition(ChannelEvent::Failed);
                    self.emit(ConnectionEvent::ConnectionFailed { reason });
                    self.reject_deferred();
                }
            }

            if !self.backoff(reconnect_delay).await {
                break;
            }

            reconnect_delay = std::cmp::min(
                reconnect_delay.saturating_mul(2),
                self.config.max_reconnect_delay,
            );
        }

        self.finish();
    }

    /// Handle an active session until it ends
    async fn run_session(&mut self, mut writer: C::Writer, mut reader: C::Reader) -> SessionEnd {
        if !self.deferred.is_empty() {
            debug!("Flushing {} held command(s)", self.deferred.len());
        }
        let mut held = std::mem::take(&mut self.deferred).into_iter();
        while let Some(outbound) = held.next() {
            if let Err(reason) = deliver(&mut writer, outbound).await {
                for outbound in held {
                    let _ = outbound.reply.send(Err(ChannelError::Send(reason.clone())));
                }
                return SessionEnd::Failed(reason);
            }
        }

        let mut keepalive = self.config.keepalive_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    match timeout(self.config.close_timeout, writer.close()).await {
                        Ok(Ok(())) => debug!("Socket connection closed"),
                        Ok(Err(e)) => debug!("Closing socket connection failed: {e:#}"),
                        Err(_) => debug!("Close handshake timed out"),
                    }
                    return SessionEnd::Shutdown;
                }

                Some(outbound) = self.outbound_rx.recv() => {
                    if let Err(reason) = deliver(&mut writer, outbound).await {
                        return SessionEnd::Failed(reason);
                    }
                }

                frame = reader.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => self.forward_inbound(text),
                    Some(Ok(Frame::Binary(data))) => {
                        warn!("Dropping binary frame ({} bytes): relay messages must be text", data.len());
                    }
                    Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
                    Some(Ok(Frame::Close { code, reason })) => {
                        return SessionEnd::Closed(format!("close frame {code} {reason}"));
                    }
                    Some(Err(e)) => return SessionEnd::Failed(format!("{e:#}")),
                    None => return SessionEnd::Closed("stream ended".into()),
                },

                _ = next_tick(&mut keepalive) => {
                    if let Err(e) = writer.send_ping().await {
                        return SessionEnd::Failed(format!("keepalive ping failed: {e:#}"));
                    }
                }
            }
        }
    }

    /// Wait before reconnecting. Returns `false` if shutdown was requested meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        debug!("Reconnecting in {:?}", delay);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown_rx.changed() => return false,
                Some(outbound) = self.outbound_rx.recv() => self.hold_or_reject(outbound),
            }
        }
    }

    fn hold_or_reject(&mut self, outbound: Outbound) {
        match self.config.send_policy {
            SendPolicy::FailFast => {
                debug!("Sending failed: no connection available");
                let _ = outbound.reply.send(Err(ChannelError::NotConnected));
            }
            SendPolicy::AwaitReconnect => {
                debug!("No connection available, holding command for the next connect attempt");
                self.deferred.push(outbound);
            }
        }
    }

    /// Queue an inbound message for the listeners without waiting on them
    fn forward_inbound(&self, text: String) {
        match self.inbound_tx.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(text)) => {
                warn!("Listeners are falling behind, dropping message: {}", text);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Dispatch task has stopped, dropping message");
            }
        }
    }

    fn reject_deferred(&mut self) {
        for outbound in self.deferred.drain(..) {
            let _ = outbound.reply.send(Err(ChannelError::NotConnected));
        }
    }

    /// Reject everything still queued and report the final state
    fn finish(&mut self) {
        self.reject_deferred();
        self.outbound_rx.close();
        while let Ok(outbound) = self.outbound_rx.try_recv() {
            let _ = outbound.reply.send(Err(ChannelError::NotConnected));
        }
        self.transition(ChannelEvent::Stopped);
    }

    fn transition(&mut self, event: ChannelEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug_assert!(is_valid_transition(from, to));
                if from != to {
                    debug!("Connection state {} -> {}", from, to);
                }
                self.state_tx.send_replace(to);
            }
            TransitionResult::Invalid { from, event } => {
                warn!("Ignoring {:?} in state {}", event, from);
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Write one command and report the outcome to its sender
async fn deliver<W: TransportWriter>(writer: &mut W, outbound: Outbound) -> Result<(), String> {
    match writer.send_text(&outbound.text).await {
        Ok(()) => {
            debug!("Sending succeeded!");
            let _ = outbound.reply.send(Ok(()));
            Ok(())
        }
        Err(e) => {
            let reason = format!("{e:#}");
            debug!("Sending failed!");
            error!("{}", reason);
            let _ = outbound.reply.send(Err(ChannelError::Send(reason.clone())));
            Err(reason)
        }
    }
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
