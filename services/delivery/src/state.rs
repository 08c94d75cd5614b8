//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::OpsStore;
use crate::handler::PollHandler;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    handler: PollHandler,
    ops: Arc<dyn OpsStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(handler: PollHandler, ops: Arc<dyn OpsStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { handler, ops }),
        }
    }

    /// Get the poll handler.
    pub fn handler(&self) -> &PollHandler {
        &self.inner.handler
    }

    /// Get the operational store surface.
    pub fn ops(&self) -> &dyn OpsStore {
        self.inner.ops.as_ref()
    }
}
