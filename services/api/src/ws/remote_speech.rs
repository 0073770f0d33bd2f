//! Speech engines that live in the browser.
//!
//! The orchestrator drives these like any local engine. Requests become
//! [`ServerMessage`]s on the connection's outbound queue; the events the
//! browser reports back are routed to the channel of the current session
//! through `deliver`.

use super::protocol::{ServerMessage, SessionId};
use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;
use tracing::debug;
use tutor_core::{
    CaptureError, PlaybackError, RecognizerEvent, SpeechRecognizer, SpeechSynthesizer,
    SynthesisEvent, Utterance, Voice,
};

type Outbound = mpsc::UnboundedSender<ServerMessage>;

struct OpenSession<T> {
    id: SessionId,
    tx: mpsc::UnboundedSender<T>,
}

/// Holds the event sender of the session currently running in the browser.
struct EventSlot<T> {
    current: Mutex<Option<OpenSession<T>>>,
    next_id: AtomicU64,
}

impl<T> EventSlot<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenSession<T>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> (SessionId, mpsc::UnboundedReceiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(OpenSession { id, tx });
        (id, rx)
    }

    fn close(&self) {
        self.lock().take();
    }

    /// Forwards `event` if session `id` is the one listening. A terminal
    /// event also closes that session. Returns false if the event was dropped.
    fn deliver(&self, id: SessionId, event: T, terminal: bool) -> bool {
        let mut current = self.lock();
        let delivered = match current.as_ref() {
            Some(session) if session.id == id => session.tx.send(event).is_ok(),
            _ => return false,
        };
        if terminal {
            current.take();
        }
        delivered
    }
}

pub struct RemoteRecognizer {
    available: bool,
    outbound: Outbound,
    events: EventSlot<RecognizerEvent>,
}

impl RemoteRecognizer {
    pub fn new(available: bool, outbound: Outbound) -> Self {
        Self {
            available,
            outbound,
            events: EventSlot::new(),
        }
    }

    /// Routes an event reported by the browser to capture session `id`.
    pub fn deliver(&self, id: SessionId, event: RecognizerEvent) {
        let terminal = !matches!(event, RecognizerEvent::Interim(_));
        if !self.events.deliver(id, event, terminal) {
            debug!(id, "Capture session not listening, dropping browser event");
        }
    }
}

impl SpeechRecognizer for RemoteRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&self, lang: &str) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, CaptureError> {
        if !self.available {
            return Err(CaptureError::Unavailable);
        }
        let (id, rx) = self.events.open();
        self.outbound
            .send(ServerMessage::StartCapture {
                id,
                lang: lang.to_string(),
            })
            .map_err(|_| CaptureError::Engine("connection closed".to_string()))?;
        Ok(rx)
    }

    fn stop(&self) {
        // The session stays open so the final transcript still arrives.
        let _ = self.outbound.send(ServerMessage::StopCapture);
    }
}

pub struct RemoteSynthesizer {
    available: bool,
    voices: Vec<Voice>,
    outbound: Outbound,
    events: EventSlot<SynthesisEvent>,
}

impl RemoteSynthesizer {
    pub fn new(available: bool, voices: Vec<Voice>, outbound: Outbound) -> Self {
        Self {
            available,
            voices,
            outbound,
            events: EventSlot::new(),
        }
    }

    /// Routes an event reported by the browser to utterance `id`.
    pub fn deliver(&self, id: SessionId, event: SynthesisEvent) {
        let terminal = event != SynthesisEvent::Started;
        if !self.events.deliver(id, event, terminal) {
            debug!(id, "Utterance not listening, dropping browser event");
        }
    }
}

impl SpeechSynthesizer for RemoteSynthesizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(
        &self,
        utterance: Utterance,
    ) -> Result<mpsc::UnboundedReceiver<SynthesisEvent>, PlaybackError> {
        if !self.available {
            return Err(PlaybackError::Unavailable);
        }
        let (id, rx) = self.events.open();
        self.outbound
            .send(ServerMessage::Speak {
                id,
                text: utterance.text,
                lang: utterance.lang,
                voice: utterance.voice.map(|v| v.name),
                rate: utterance.rate,
                pitch: utterance.pitch,
            })
            .map_err(|_| PlaybackError::Engine("connection closed".to_string()))?;
        Ok(rx)
    }

    fn cancel(&self) {
        self.events.close();
        let _ = self.outbound.send(ServerMessage::CancelSpeech);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.into(),
            lang: "en-US".into(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
        }
    }

    fn spoken_id(browser: &mut mpsc::UnboundedReceiver<ServerMessage>) -> SessionId {
        match browser.try_recv().unwrap() {
            ServerMessage::Speak { id, .. } => id,
            other => panic!("Expected Speak, got {other:?}"),
        }
    }

    #[test]
    fn test_recognizer_relays_start_and_events() {
        let (outbound, mut browser) = mpsc::unbounded_channel();
        let recognizer = RemoteRecognizer::new(true, outbound);

        let mut events = recognizer.start("hi-IN").unwrap();
        let id = match browser.try_recv().unwrap() {
            ServerMessage::StartCapture { id, lang } => {
                assert_eq!(lang, "hi-IN");
                id
            }
            other => panic!("Expected StartCapture, got {other:?}"),
        };

        recognizer.deliver(id, RecognizerEvent::Interim("नमस्ते".into()));
        recognizer.stop();
        assert!(matches!(browser.try_recv().unwrap(), ServerMessage::StopCapture));
        recognizer.deliver(id, RecognizerEvent::Ended);

        assert_eq!(events.try_recv().unwrap(), RecognizerEvent::Interim("नमस्ते".into()));
        assert_eq!(events.try_recv().unwrap(), RecognizerEvent::Ended);
        // The session closes after a terminal event.
        assert!(events.try_recv().is_err());
        recognizer.deliver(id, RecognizerEvent::Interim("late".into()));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_restarted_capture_ignores_events_from_previous_session() {
        let (outbound, mut browser) = mpsc::unbounded_channel();
        let recognizer = RemoteRecognizer::new(true, outbound);

        let _first = recognizer.start("en-US").unwrap();
        let first_id = match browser.try_recv().unwrap() {
            ServerMessage::StartCapture { id, .. } => id,
            other => panic!("Expected StartCapture, got {other:?}"),
        };
        let mut second = recognizer.start("en-US").unwrap();
        let second_id = match browser.try_recv().unwrap() {
            ServerMessage::StartCapture { id, .. } => id,
            other => panic!("Expected StartCapture, got {other:?}"),
        };
        assert_ne!(first_id, second_id);

        recognizer.deliver(first_id, RecognizerEvent::Failed("aborted".into()));
        recognizer.deliver(second_id, RecognizerEvent::Interim("photosynthesis".into()));

        assert_eq!(
            second.try_recv().unwrap(),
            RecognizerEvent::Interim("photosynthesis".into())
        );
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_unavailable_recognizer_does_not_contact_browser() {
        let (outbound, mut browser) = mpsc::unbounded_channel();
        let recognizer = RemoteRecognizer::new(false, outbound);
        assert_eq!(recognizer.start("en-US").unwrap_err(), CaptureError::Unavailable);
        assert!(browser.try_recv().is_err());
    }

    #[test]
    fn test_synthesizer_sends_voice_name_and_cancels() {
        let (outbound, mut browser) = mpsc::unbounded_channel();
        let voices = vec![Voice {
            name: "Lekha".into(),
            lang: "hi-IN".into(),
        }];
        let synthesizer = RemoteSynthesizer::new(true, voices.clone(), outbound);
        assert_eq!(synthesizer.voices(), voices);

        let mut events = synthesizer
            .speak(Utterance {
                text: "नमस्ते".into(),
                lang: "hi-IN".into(),
                voice: voices.first().cloned(),
                rate: 0.9,
                pitch: 1.0,
            })
            .unwrap();
        let id = match browser.try_recv().unwrap() {
            ServerMessage::Speak { id, voice, rate, .. } => {
                assert_eq!(voice.as_deref(), Some("Lekha"));
                assert_eq!(rate, 0.9);
                id
            }
            other => panic!("Expected Speak, got {other:?}"),
        };

        synthesizer.deliver(id, SynthesisEvent::Started);
        assert_eq!(events.try_recv().unwrap(), SynthesisEvent::Started);

        synthesizer.cancel();
        assert!(matches!(browser.try_recv().unwrap(), ServerMessage::CancelSpeech));
        synthesizer.deliver(id, SynthesisEvent::Ended);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_late_failure_of_cancelled_utterance_keeps_new_one_open() {
        let (outbound, mut browser) = mpsc::unbounded_channel();
        let synthesizer = RemoteSynthesizer::new(true, vec![], outbound);

        let mut first = synthesizer.speak(utterance("first")).unwrap();
        let first_id = spoken_id(&mut browser);
        synthesizer.cancel();
        assert!(matches!(browser.try_recv().unwrap(), ServerMessage::CancelSpeech));

        let mut second = synthesizer.speak(utterance("second")).unwrap();
        let second_id = spoken_id(&mut browser);

        // The browser reports the interrupted first utterance only now.
        synthesizer.deliver(first_id, SynthesisEvent::Failed("interrupted".into()));
        synthesizer.deliver(second_id, SynthesisEvent::Started);

        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().unwrap(), SynthesisEvent::Started);
        assert!(second.try_recv().is_err());

        synthesizer.deliver(second_id, SynthesisEvent::Ended);
        assert_eq!(second.try_recv().unwrap(), SynthesisEvent::Ended);
    }

    #[test]
    fn test_closed_connection_is_engine_error() {
        let (outbound, browser) = mpsc::unbounded_channel();
        drop(browser);
        let synthesizer = RemoteSynthesizer::new(true, vec![], outbound);
        let err = synthesizer.speak(utterance("hello")).unwrap_err();
        assert!(matches!(err, PlaybackError::Engine(_)));
    }
}
