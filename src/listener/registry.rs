//! Ordered registry of inbound message listeners

use irtv_shared::WireMessage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Callback invoked with every raw inbound message
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct ListenerEntry {
    id: String,
    callback: MessageCallback,
}

/// Fan-out of inbound messages to registered listeners.
///
/// Entries are keyed by id; adding an id that already exists replaces its
/// callback in place. Dispatch follows registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<ListenerEntry>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `true` if an existing listener with the same id was replaced.
    pub fn add<F>(&self, id: impl Into<String>, callback: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = id.into();
        let callback: MessageCallback = Arc::new(callback);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            debug!("Replacing message listener {}", id);
            entry.callback = callback;
            return true;
        }

        debug!("Adding message listener {}", id);
        entries.push(ListenerEntry { id, callback });
        false
    }

    /// Remove the listener with this id. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;

        if removed {
            debug!("Removed message listener {}", id);
        }
        removed
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in dispatch order
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }

    /// Deliver one raw message to every listener, in registration order.
    ///
    /// Works on a snapshot so callbacks may add or remove listeners. A panicking
    /// callback is logged and the remaining listeners still run.
    /// Returns the number of callbacks that completed.
    pub fn dispatch(&self, raw: &str) -> usize {
        let message = WireMessage::decode(raw);
        debug!(
            "received message: command={:?} payload={:?}",
            message.command, message.payload
        );

        let snapshot: Vec<(String, MessageCallback)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| (e.id.clone(), e.callback.clone()))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(raw))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    error!("Message listener {} panicked: {}", id, reason);
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
