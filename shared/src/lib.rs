//! IR TV Relay Shared Protocol Types
//!
//! This crate provides the wire codec, notification parsing and the connection
//! state machine shared by everything that talks to the IR relay.

pub mod codec;
pub mod notification;
pub mod state_machine;

pub use codec::{CodecError, WireMessage};
pub use notification::{Notification, PowerState};
pub use state_machine::{ChannelEvent, ConnectionState, ConnectionStateMachine, TransitionResult};

/// Separator between command and payload on the wire
pub const DELIMITER: char = ';';

/// Command names with a meaning on the relay side
pub mod commands {
    /// Transmit an infrared code; rewritten to `IR-SEND:<codeType>` before sending
    pub const IR_SEND: &str = "IR-SEND";

    /// Power state notification emitted by the relay
    pub const POWER_STATE: &str = "POWER_STATE";
}

/// Timing parameters for the relay connection
pub mod timing {
    /// Delay before reconnecting after a failure
    pub const RECONNECT_DELAY_MS: u64 = 1000;

    /// Upper bound for the reconnect delay when backoff growth is enabled
    pub const MAX_RECONNECT_DELAY_MS: u64 = 1000;

    /// Connect attempt timeout
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Time allowed for a close handshake on shutdown
    pub const CLOSE_TIMEOUT_MS: u64 = 1000;
}
