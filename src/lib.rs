//! Resilient command and notification channel to an IR relay
//!
//! The relay speaks a line-oriented `COMMAND;PAYLOAD` protocol over a
//! WebSocket. [`RelayChannel`] keeps exactly one session alive, reconnects
//! after failures and fans inbound notifications out to registered listeners.

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod transport;

#[cfg(test)]
mod testing;

pub use channel::RelayChannel;
pub use config::{ChannelConfig, Endpoint, SendPolicy};
pub use connection::{ConnectionEvent, ConnectionState};
pub use error::{ChannelError, ConfigError};
pub use listener::ListenerRegistry;

pub use irtv_shared::{commands, CodecError, Notification, PowerState, WireMessage};
