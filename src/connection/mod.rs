//! Connection management for the persistent relay session
//!
//! This module handles:
//! - A single live relay session owned by one task
//! - Automatic reconnection with fixed or capped-doubling backoff
//! - Holding or rejecting commands while disconnected
//! - Forwarding inbound text frames to the listener registry

mod manager;

pub use irtv_shared::ConnectionState;
pub use manager::{ConnectionEvent, ConnectionManager};
