//! WebSocket Session Management
//!
//! Each browser connection gets its own orchestrator. The browser owns the
//! speech engines, so this module relays engine traffic both ways:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `remote_speech`: Speech engine implementations that forward to the browser.

pub mod protocol;
mod remote_speech;
pub mod session;

pub use session::ws_handler;
