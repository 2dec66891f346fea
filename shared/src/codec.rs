//! Text codec for relay messages
//!
//! Every message is a single text frame:
//! ```text
//! COMMAND;PAYLOAD
//! ```
//!
//! Only the first delimiter is significant. The payload may be empty and may
//! itself contain the delimiter.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::{commands, DELIMITER};

/// Errors that can occur while building a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("Command {0:?} contains the message delimiter")]
    DelimiterInCommand(String),
}

/// A decoded or ready-to-send relay message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub command: String,
    pub payload: String,
}

impl WireMessage {
    /// Build a message, validating the command
    pub fn new(command: impl Into<String>, payload: impl Into<String>) -> Result<Self, CodecError> {
        let command = command.into();

        if command.is_empty() {
            return Err(CodecError::EmptyCommand);
        }
        if command.contains(DELIMITER) {
            return Err(CodecError::DelimiterInCommand(command));
        }

        Ok(Self {
            command,
            payload: payload.into(),
        })
    }

    /// Build an outbound message, namespacing the reserved IR command with the code type.
    /// The resolved command is validated again so the code type cannot split the frame.
    pub fn outbound(command: &str, payload: &str, code_type: &str) -> Result<Self, CodecError> {
        let message = Self::new(command, payload)?;
        Self::new(
            resolve_command(&message.command, code_type).into_owned(),
            message.payload,
        )
    }

    /// Decode a raw text frame. Never fails: a frame without a delimiter is all command.
    pub fn decode(raw: &str) -> Self {
        match raw.split_once(DELIMITER) {
            Some((command, payload)) => Self {
                command: command.to_string(),
                payload: payload.to_string(),
            },
            None => Self {
                command: raw.to_string(),
                payload: String::new(),
            },
        }
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.command.len() + 1 + self.payload.len());
        out.push_str(&self.command);
        out.push(DELIMITER);
        out.push_str(&self.payload);
        out
    }

    /// Check whether this message carries the given command
    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.command, DELIMITER, self.payload)
    }
}

/// Resolve the command actually sent on the wire
///
/// `IR-SEND` becomes `IR-SEND:<code_type>`; every other command passes through.
pub fn resolve_command<'a>(command: &'a str, code_type: &str) -> Cow<'a, str> {
    if command == commands::IR_SEND {
        Cow::Owned(format!("{}:{}", commands::IR_SEND, code_type))
    } else {
        Cow::Borrowed(command)
    }
}
