//! Channel configuration

use crate::error::ConfigError;
use irtv_shared::{timing, DELIMITER};
use std::time::Duration;

/// Relay endpoint. Immutable for the lifetime of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Optional path; a leading `/` is ignored
    pub path: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// WebSocket URL of the relay
    pub fn url(&self) -> String {
        let path = self
            .path
            .as_deref()
            .map(|p| p.strip_prefix('/').unwrap_or(p))
            .unwrap_or("");
        format!("ws://{}:{}/{}", self.host, self.port, path)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 81)
    }
}

/// What `send_command` does while no session is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Reject immediately with `NotConnected`
    FailFast,
    /// Hold the command for the outcome of exactly one connect attempt
    #[default]
    AwaitReconnect,
}

/// Configuration for a relay channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Relay endpoint
    pub endpoint: Endpoint,
    /// IR protocol identifier appended to `IR-SEND` (e.g. `NEC`)
    pub code_type: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Time allowed for the close handshake on stop
    pub close_timeout: Duration,
    /// Ping interval on a live session; `None` disables keepalive
    pub keepalive_interval: Option<Duration>,
    /// Behaviour of sends while disconnected
    pub send_policy: SendPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            code_type: "NEC".into(),
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(timing::MAX_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            close_timeout: Duration::from_millis(timing::CLOSE_TIMEOUT_MS),
            keepalive_interval: None,
            send_policy: SendPolicy::default(),
        }
    }
}

impl ChannelConfig {
    /// Check the configuration before building a channel from it
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.code_type.trim().is_empty() {
            return Err(ConfigError::EmptyCodeType);
        }
        if self.code_type.contains(DELIMITER) {
            return Err(ConfigError::DelimiterInCodeType(self.code_type.clone()));
        }
        if self.reconnect_delay.is_zero() {
            return Err(ConfigError::ZeroReconnectDelay);
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(ConfigError::BackoffCapTooSmall {
                delay: self.reconnect_delay,
                max: self.max_reconnect_delay,
            });
        }
        Ok(())
    }
}
