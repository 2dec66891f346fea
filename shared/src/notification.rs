//! Inbound notifications from the relay

use crate::{commands, WireMessage, DELIMITER};

/// Reported power state of the television
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Parse a power state payload. Anything other than `on` means off.
    pub fn from_payload(payload: &str) -> Self {
        if payload == "on" {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `POWER_STATE;<on|off>`
    PowerState(PowerState),
    /// Anything this crate does not interpret
    Other(WireMessage),
}

impl Notification {
    /// Classify a raw inbound text frame. A power state needs the delimiter; a bare
    /// `POWER_STATE` is left uninterpreted.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(DELIMITER) {
            Some((command, payload)) if command == commands::POWER_STATE => {
                Notification::PowerState(PowerState::from_payload(payload))
            }
            _ => Notification::Other(WireMessage::decode(raw)),
        }
    }
}
