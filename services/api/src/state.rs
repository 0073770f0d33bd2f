//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources shared
//! by every connection: configuration and the completion gateway.

use crate::config::Config;
use std::{path::PathBuf, sync::Arc};
use tutor_core::CompletionGateway;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// One gateway (and HTTP connection pool) serves every conversation.
    pub gateway: CompletionGateway,
}

impl AppState {
    /// Directory holding the stored conversation for `client_id`.
    pub fn client_dir(&self, client_id: &str) -> PathBuf {
        self.config.data_dir.join(client_id)
    }
}
