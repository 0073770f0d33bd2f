use crate::{
    message::{Conversation, Language},
    skill::SkillTag,
};
use serde::Serialize;

/// A read-only snapshot of one conversation, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorState {
    pub conversation: Conversation,
    pub active_skill: SkillTag,
    pub language: Language,
    pub sound_enabled: bool,
    pub is_capturing: bool,
    pub is_speaking: bool,
    pub is_awaiting_reply: bool,
    /// Transcript captured from speech, waiting for the learner to submit it.
    pub pending_input: String,
    /// False once the platform turned out to have no speech recognition.
    pub capture_available: bool,
    pub playback_available: bool,
}

impl OrchestratorState {
    pub(crate) fn new(
        conversation: Conversation,
        language: Language,
        sound_enabled: bool,
        capture_available: bool,
        playback_available: bool,
    ) -> Self {
        Self {
            conversation,
            active_skill: SkillTag::General,
            language,
            sound_enabled,
            is_capturing: false,
            is_speaking: false,
            is_awaiting_reply: false,
            pending_input: String::new(),
            capture_available,
            playback_available,
        }
    }

    /// Whether a new turn may be submitted.
    pub fn is_idle(&self) -> bool {
        !self.is_awaiting_reply
    }
}
