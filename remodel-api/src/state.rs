//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;

use crate::store::TaskStore;

/// Application-wide state shared across all routes.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            start_time: Instant::now(),
        }
    }
}
