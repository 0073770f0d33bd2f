//! Speech Capture and Playback
//!
//! Platform speech engines are reached through two small traits:
//!
//! - `capture`: [`SpeechRecognizer`] (speech-to-text) and the [`SpeechCapture`] service.
//! - `playback`: [`SpeechSynthesizer`] (text-to-speech) and the [`SpeechPlayback`] service.
//!
//! Each trait has a null implementation for platforms without the capability,
//! so the orchestrator never checks for engine presence itself. Engine events
//! are forwarded into a channel owned by the orchestrator, tagged with the
//! session (or utterance) they belong to so that stale events can be ignored.

pub mod capture;
pub mod playback;

pub use capture::{
    CaptureState, CaptureUpdate, RecognizerEvent, SpeechCapture, SpeechRecognizer,
    UnavailableRecognizer,
};
pub use playback::{
    PlaybackState, PlaybackUpdate, SilentSynthesizer, SpeechPlayback, SpeechSynthesizer,
    SynthesisEvent, Utterance, Voice,
};
