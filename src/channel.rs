//! Relay channel: the public command and notification API
//!
//! Combines the connection manager, the listener registry and the command
//! rewriting rules into the surface used by accessory adapters.

use crate::config::ChannelConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::error::{ChannelError, ConfigError};
use crate::listener::ListenerRegistry;
use crate::transport::{TransportConnector, WebSocketConnector};
use irtv_shared::WireMessage;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Resilient command/notification channel to the IR relay
pub struct RelayChannel<C: TransportConnector = WebSocketConnector> {
    code_type: String,
    listeners: Arc<ListenerRegistry>,
    connection: ConnectionManager<C>,
}

impl RelayChannel<WebSocketConnector> {
    /// Create a channel to the configured WebSocket endpoint
    pub fn new(config: ChannelConfig) -> Result<Self, ConfigError> {
        let connector = WebSocketConnector::for_endpoint(&config.endpoint);
        Self::with_connector(connector, config)
    }
}

impl<C: TransportConnector> RelayChannel<C> {
    /// Create a channel over a custom transport
    pub fn with_connector(connector: C, config: ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let listeners = Arc::new(ListenerRegistry::new());
        Ok(Self {
            code_type: config.code_type.clone(),
            listeners: listeners.clone(),
            connection: ConnectionManager::new(connector, config, listeners),
        })
    }

    /// Start connecting. Returns `false` if the channel is already running.
    pub fn start(&self) -> bool {
        self.connection.start()
    }

    /// Close the session and stop reconnecting
    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    /// Register a callback for every inbound message. Re-using an id replaces the callback.
    pub fn add_message_listener<F>(&self, id: impl Into<String>, callback: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add(id, callback)
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn remove_message_listener(&self, id: &str) -> bool {
        self.listeners.remove(id)
    }

    /// Send a command to the relay.
    ///
    /// Resolves once the frame has been written to the transport; there is no
    /// acknowledgement from the relay itself.
    pub async fn send_command(&self, command: &str, payload: &str) -> Result<(), ChannelError> {
        let message = WireMessage::outbound(command, payload, &self.code_type)?;
        debug!(
            "SENDING SOCKET MESSAGE: command={:?} payload={:?}",
            message.command, message.payload
        );

        self.connection.submit(message.encode()).await
    }

    /// Send a command with an empty payload
    pub async fn send(&self, command: &str) -> Result<(), ChannelError> {
        self.send_command(command, "").await
    }

    pub fn code_type(&self) -> &str {
        &self.code_type
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_running()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.events()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}
