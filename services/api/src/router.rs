//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the application: the WebSocket
//! endpoint that hosts conversations and a liveness check.

use crate::{state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;

async fn health() -> &'static str {
    "ok"
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(app_state)
}
