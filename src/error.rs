//! Errors surfaced by the relay channel

use irtv_shared::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a failed `send_command`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("No connection available")]
    NotConnected,

    #[error("Sending failed: {0}")]
    Send(String),

    #[error("Invalid command: {0}")]
    Codec(#[from] CodecError),
}

/// Rejected channel configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Relay host must not be empty")]
    EmptyHost,

    #[error("Relay port must not be 0")]
    InvalidPort,

    #[error("IR code type must not be empty")]
    EmptyCodeType,

    #[error("IR code type {0:?} contains the message delimiter")]
    DelimiterInCodeType(String),

    #[error("Reconnect delay must be greater than zero")]
    ZeroReconnectDelay,

    #[error("Maximum reconnect delay {max:?} is below the reconnect delay {delay:?}")]
    BackoffCapTooSmall { delay: Duration, max: Duration },
}
