//! Error types for the tutoring core.
//!
//! None of these errors is fatal to a running conversation. Each component
//! recovers locally: capture falls back to typed input, playback to text-only,
//! the gateway to a canned reply, and the store to in-memory state.

/// Failures of the speech-to-text engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech recognition is not available on this platform")]
    Unavailable,
    #[error("Speech recognition failed: {0}")]
    Engine(String),
}

/// Failures of the text-to-speech engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Speech synthesis is not available on this platform")]
    Unavailable,
    #[error("Speech synthesis failed: {0}")]
    Engine(String),
}

/// Failures of a single chat-completion request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Completion request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Completion endpoint returned status {0}")]
    Status(u16),
    #[error("Malformed completion reply: {0}")]
    Malformed(String),
    #[error("Completion request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures of the key/value persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage backend rejected the operation: {0}")]
    Backend(String),
}
