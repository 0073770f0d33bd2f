use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Primary language subtags written in Devanagari. Spoken slightly slower.
const DEVANAGARI_LANGUAGES: [&str; 4] = ["hi", "mr", "ne", "sa"];

/// A voice offered by the synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

/// A single request to speak some text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    /// `None` lets the engine use its default voice.
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
}

/// Events emitted by a text-to-speech engine for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Failed(String),
}

/// An asynchronous text-to-speech engine.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether the platform provides speech synthesis at all.
    fn is_available(&self) -> bool;

    /// The voices currently installed.
    fn voices(&self) -> Vec<Voice>;

    /// Begins speaking `utterance`. Its events arrive on the returned channel.
    fn speak(
        &self,
        utterance: Utterance,
    ) -> Result<mpsc::UnboundedReceiver<SynthesisEvent>, PlaybackError>;

    /// Silences whatever is being spoken.
    fn cancel(&self);
}

/// Synthesizer used where the platform cannot speak.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn is_available(&self) -> bool {
        false
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn speak(
        &self,
        _utterance: Utterance,
    ) -> Result<mpsc::UnboundedReceiver<SynthesisEvent>, PlaybackError> {
        Err(PlaybackError::Unavailable)
    }

    fn cancel(&self) {}
}

/// A synthesis event tagged with the utterance it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackUpdate {
    pub utterance: u64,
    pub event: SynthesisEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Speaking,
}

/// Owns the single utterance a conversation may have in flight.
pub struct SpeechPlayback {
    engine: Arc<dyn SpeechSynthesizer>,
    updates: mpsc::UnboundedSender<PlaybackUpdate>,
    state: PlaybackState,
    utterance: u64,
    in_flight: bool,
    forwarder: Option<JoinHandle<()>>,
}

impl SpeechPlayback {
    pub fn new(
        engine: Arc<dyn SpeechSynthesizer>,
        updates: mpsc::UnboundedSender<PlaybackUpdate>,
    ) -> Self {
        Self {
            engine,
            updates,
            state: PlaybackState::Idle,
            utterance: 0,
            in_flight: false,
            forwarder: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == PlaybackState::Speaking
    }

    /// Speaks `text` in `lang`, superseding any utterance still in flight.
    ///
    /// Returns `Ok(false)` without touching the engine when sound is disabled,
    /// the engine is absent, or there is nothing to say.
    pub fn speak(&mut self, text: &str, lang: &str, sound_enabled: bool) -> Result<bool, PlaybackError> {
        if !sound_enabled || !self.engine.is_available() || text.trim().is_empty() {
            return Ok(false);
        }

        self.cancel();

        let utterance = Utterance {
            text: text.to_string(),
            lang: lang.to_string(),
            voice: select_voice(&self.engine.voices(), lang),
            rate: rate_for(lang),
            pitch: 1.0,
        };
        debug!(lang, voice = ?utterance.voice, rate = utterance.rate, "Speaking reply");

        let mut rx = self.engine.speak(utterance)?;
        self.utterance += 1;
        self.in_flight = true;
        let id = self.utterance;
        let tx = self.updates.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tx.send(PlaybackUpdate { utterance: id, event }).is_err() {
                    break;
                }
            }
        }));
        Ok(true)
    }

    /// Forces playback back to idle. Returns whether anything was cancelled.
    pub fn cancel(&mut self) -> bool {
        let had_work = self.in_flight || self.is_speaking();
        if self.in_flight {
            self.engine.cancel();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.in_flight = false;
        self.state = PlaybackState::Idle;
        if had_work {
            info!(utterance = self.utterance, "Playback cancelled");
        }
        had_work
    }

    /// Applies an engine event. Returns whether the playback state changed.
    pub fn apply(&mut self, update: PlaybackUpdate) -> bool {
        if update.utterance != self.utterance || !self.in_flight {
            debug!(utterance = update.utterance, current = self.utterance, "Dropping stale playback event");
            return false;
        }
        let previous = self.state;
        match update.event {
            SynthesisEvent::Started => self.state = PlaybackState::Speaking,
            SynthesisEvent::Ended => {
                self.in_flight = false;
                self.state = PlaybackState::Idle;
            }
            SynthesisEvent::Failed(reason) => {
                warn!(utterance = update.utterance, %reason, "Playback failed");
                self.in_flight = false;
                self.state = PlaybackState::Idle;
            }
        }
        previous != self.state
    }
}

fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_']).next().unwrap_or(tag).to_ascii_lowercase()
}

/// Picks the voice that best matches `lang`: exact tag, then same language,
/// then any installed voice.
pub fn select_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let wanted = lang.replace('_', "-");
    let base = primary_subtag(lang);
    voices
        .iter()
        .find(|v| v.lang.replace('_', "-").eq_ignore_ascii_case(&wanted))
        .or_else(|| voices.iter().find(|v| primary_subtag(&v.lang) == base))
        .or_else(|| voices.first())
        .cloned()
}

/// Speaking rate for `lang`.
pub fn rate_for(lang: &str) -> f32 {
    if DEVANAGARI_LANGUAGES.contains(&primary_subtag(lang).as_str()) {
        0.9
    } else {
        1.0
    }
}
