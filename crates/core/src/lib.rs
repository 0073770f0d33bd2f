//! Core logic for the conversational tutor.
//!
//! A learner types or speaks into an [`Orchestrator`], which routes each turn
//! to one of several tutoring personas, fetches a reply from an
//! OpenAI-compatible chat completion endpoint (falling back to canned
//! bilingual replies when the network fails), persists the conversation and
//! reads replies aloud.
//!
//! Hosts supply the platform pieces through traits: a [`KeyValueBackend`]
//! for storage, a [`ChatClient`] for completions, and a [`SpeechRecognizer`]
//! and [`SpeechSynthesizer`] for speech.

pub mod error;
pub mod fallback;
pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod prompts;
pub mod skill;
pub mod speech;
pub mod store;

pub use error::{CaptureError, GatewayError, PlaybackError, StoreError};
pub use gateway::{
    ChatClient, CompletionGateway, CompletionRequest, GatewayConfig, OpenAICompatibleClient, Reply,
    ReplySource,
};
pub use message::{Conversation, Language, LanguageTags, Message, Role};
pub use orchestrator::{
    Command, Orchestrator, OrchestratorConfig, OrchestratorHandle, OrchestratorState,
};
pub use skill::{ClassificationResult, SkillTag, classify};
pub use speech::{
    RecognizerEvent, SilentSynthesizer, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
    UnavailableRecognizer, Utterance, Voice,
};
pub use store::{ConversationStore, FileBackend, KeyValueBackend, MemoryBackend, StoredSession};
