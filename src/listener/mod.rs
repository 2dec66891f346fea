//! Listener registry for inbound relay messages

mod registry;

pub use registry::{ListenerRegistry, MessageCallback};
