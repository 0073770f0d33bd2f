use crate::error::CaptureError;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Events emitted by a speech-to-text engine during one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// The cumulative transcript so far. Replaces any earlier interim text.
    Interim(String),
    /// The engine detected the end of speech or was stopped.
    Ended,
    /// The session failed mid-way.
    Failed(String),
}

/// An asynchronous, event-driven speech-to-text engine.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether the platform provides speech recognition at all.
    fn is_available(&self) -> bool;

    /// Starts a session recognizing `lang` (a BCP-47 tag). Events for the
    /// session are delivered on the returned channel until it closes.
    fn start(&self, lang: &str) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, CaptureError>;

    /// Asks the engine to stop the current session.
    fn stop(&self);
}

/// Recognizer used where the platform has no speech-to-text capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&self, _lang: &str) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, CaptureError> {
        Err(CaptureError::Unavailable)
    }

    fn stop(&self) {}
}

/// A recognizer event tagged with the capture session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureUpdate {
    pub session: u64,
    pub event: RecognizerEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing,
}

/// Owns the single capture session a conversation may have at a time.
pub struct SpeechCapture {
    engine: Arc<dyn SpeechRecognizer>,
    updates: mpsc::UnboundedSender<CaptureUpdate>,
    state: CaptureState,
    session: u64,
    forwarder: Option<JoinHandle<()>>,
}

impl SpeechCapture {
    /// Creates the service. Engine events are forwarded to `updates`.
    pub fn new(
        engine: Arc<dyn SpeechRecognizer>,
        updates: mpsc::UnboundedSender<CaptureUpdate>,
    ) -> Self {
        Self {
            engine,
            updates,
            state: CaptureState::Idle,
            session: 0,
            forwarder: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Starts a capture session in `lang`.
    ///
    /// Returns `Ok(false)` without touching the engine if a session is
    /// already running.
    pub fn start(&mut self, lang: &str) -> Result<bool, CaptureError> {
        if self.is_capturing() {
            debug!("Capture already active, ignoring start");
            return Ok(false);
        }
        if !self.engine.is_available() {
            return Err(CaptureError::Unavailable);
        }

        let mut rx = self.engine.start(lang)?;
        self.session += 1;
        let session = self.session;
        let tx = self.updates.clone();

        if let Some(previous) = self.forwarder.take() {
            previous.abort();
        }
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tx.send(CaptureUpdate { session, event }).is_err() {
                    break;
                }
            }
        }));

        self.state = CaptureState::Capturing;
        info!(session, lang, "Speech capture started");
        Ok(true)
    }

    /// Stops the running session. Returns whether anything changed.
    ///
    /// Late interim results from the stopped session are still delivered so
    /// the final transcript is not lost.
    pub fn stop(&mut self) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.engine.stop();
        self.state = CaptureState::Idle;
        info!(session = self.session, "Speech capture stopped");
        true
    }

    /// Applies an update from the engine, returning the event if it belongs
    /// to the current session.
    pub fn apply(&mut self, update: CaptureUpdate) -> Option<RecognizerEvent> {
        if update.session != self.session {
            debug!(session = update.session, current = self.session, "Dropping stale capture event");
            return None;
        }
        match &update.event {
            RecognizerEvent::Interim(_) => {}
            RecognizerEvent::Ended => {
                self.state = CaptureState::Idle;
            }
            RecognizerEvent::Failed(reason) => {
                warn!(session = update.session, %reason, "Speech capture failed");
                self.state = CaptureState::Idle;
            }
        }
        Some(update.event)
    }

    /// Stops the engine and drops the event forwarder.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
