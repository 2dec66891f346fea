//! Connection State Machine
//!
//! Defines the relay connection states and the events allowed to move between them.
//! There is no terminal state: every failure path leads back to `Connecting`.

/// State of the relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started, or stopped
    #[default]
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// A session is live
    Connected,
    /// The last attempt or session failed; a reconnect is scheduled
    Error,
    /// The relay closed the session; reconnecting immediately
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Events that drive state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connect attempt begins
    ConnectStarted,
    /// The transport opened
    Opened,
    /// Connect failure or mid-session error
    Failed,
    /// The relay closed the session
    RemoteClosed,
    /// Shutdown requested
    Stopped,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: ChannelEvent,
    },
}

/// Tracks the connection state and rejects impossible transitions
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Whether a transport session is live
    pub fn is_connected(&self) -> bool {
        self.current_state == ConnectionState::Connected
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ChannelEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: ChannelEvent) -> Option<ConnectionState> {
        use ChannelEvent::*;
        use ConnectionState::*;

        match (self.current_state, event) {
            // Stop is honoured from anywhere
            (_, Stopped) => Some(Disconnected),

            (Disconnected | Error | Closed, ConnectStarted) => Some(Connecting),

            (Connecting, Opened) => Some(Connected),
            (Connecting, Failed) => Some(Error),

            (Connected, Failed) => Some(Error),
            (Connected, RemoteClosed) => Some(Closed),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        (a, b) if a == b => true,
        (_, Disconnected) => true,
        (Disconnected | Error | Closed, Connecting) => true,
        (Connecting, Connected | Error) => true,
        (Connected, Error | Closed) => true,
        _ => false,
    }
}
