//! Tutor API Library Crate
//!
//! This library contains the web host for the tutor: configuration, shared
//! state, routing, and the WebSocket session that mounts one orchestrator per
//! browser connection. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod router;
pub mod state;
pub mod ws;
