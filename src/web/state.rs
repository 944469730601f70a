//! Shared application state.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::{SharedStorage, Storage};

pub struct AppState {
    pub storage: SharedStorage,
    /// Debounce interval handed to chat-list watchers.
    pub settle: Duration,
    pub ws_connection_count: Arc<AtomicUsize>,
}

/// The storage handle carries its own lock, so the state itself is immutable.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(storage: Storage, settle: Duration) -> SharedState {
        Arc::new(Self {
            storage: Arc::new(tokio::sync::Mutex::new(storage)),
            settle,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}
