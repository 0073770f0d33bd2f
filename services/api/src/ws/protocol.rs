//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::{OrchestratorState, Voice};
use uuid::Uuid;

/// Identifies one capture session or utterance in the browser. The browser
/// echoes it on every event so late reports from a replaced session can be
/// told apart.
pub type SessionId = u64;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the conversation. This must be the first message.
    Init {
        /// Stable identifier of the learner's browser; selects stored history.
        client_id: Uuid,
        /// The chapter or topic under study.
        #[serde(default)]
        context: String,
        /// Whether the browser can recognize speech.
        #[serde(default)]
        speech_recognition: bool,
        /// Whether the browser can synthesize speech.
        #[serde(default)]
        speech_synthesis: bool,
        #[serde(default)]
        voices: Vec<Voice>,
    },
    Submit {
        text: String,
    },
    StartCapture,
    StopCapture,
    ToggleLanguage,
    ToggleSound,
    ClearHistory,
    // Engine traffic reported by the browser. `id` echoes the id of the
    // `start_capture` or `speak` request the event belongs to.
    CaptureInterim {
        id: SessionId,
        text: String,
    },
    CaptureEnded {
        id: SessionId,
    },
    CaptureFailed {
        id: SessionId,
        message: String,
    },
    SpeechStarted {
        id: SessionId,
    },
    SpeechEnded {
        id: SessionId,
    },
    SpeechFailed {
        id: SessionId,
        message: String,
    },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full orchestrator state after a change.
    State { state: OrchestratorState },
    /// Ask the browser to begin recognizing speech in `lang`.
    StartCapture { id: SessionId, lang: String },
    StopCapture,
    /// Ask the browser to speak an utterance, replacing any current one.
    Speak {
        id: SessionId,
        text: String,
        lang: String,
        voice: Option<String>,
        rate: f32,
        pitch: f32,
    },
    CancelSpeech,
    /// Reports a fatal error to the client.
    Error { message: String },
}
