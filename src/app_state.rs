use std::sync::Arc;

use crate::db::JobStore;
use crate::services::queue::MessageQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn MessageQueue>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { store, queue }
    }
}
