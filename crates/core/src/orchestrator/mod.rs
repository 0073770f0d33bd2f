//! Conversation Orchestrator
//!
//! Owns one learner's conversation: routes each submission to a persona,
//! requests a reply through the [`CompletionGateway`], persists every change
//! through the [`ConversationStore`] and drives speech capture and playback.
//!
//! The orchestrator runs as a single task. Hosts talk to it through an
//! [`OrchestratorHandle`]: commands go in over a channel and every transition
//! publishes a fresh [`OrchestratorState`] snapshot on a `watch` channel.

mod runtime;
mod state;

pub use state::OrchestratorState;

use crate::{
    gateway::CompletionGateway,
    message::LanguageTags,
    speech::{
        SilentSynthesizer, SpeechCapture, SpeechPlayback, SpeechRecognizer, SpeechSynthesizer,
        UnavailableRecognizer,
    },
    store::ConversationStore,
};
use runtime::{Inbox, Runtime};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, error, info_span, warn};

/// Fixed inputs of one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// The chapter or topic under study. May be empty.
    pub context: String,
    /// BCP-47 tags bound to the primary and secondary language.
    pub languages: LanguageTags,
}

impl OrchestratorConfig {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            languages: LanguageTags::default(),
        }
    }

    pub fn with_languages(mut self, languages: LanguageTags) -> Self {
        self.languages = languages;
        self
    }
}

/// Operations a host can ask of a running orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send the learner's text as a new turn.
    Submit(String),
    StartCapture,
    StopCapture,
    ToggleLanguage,
    ToggleSound,
    /// Forget the conversation and start over from the welcome message.
    ClearHistory,
    Shutdown,
}

/// Assembles an orchestrator. Speech engines default to the null engines.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    store: ConversationStore,
    gateway: CompletionGateway,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl OrchestratorBuilder {
    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Restores the stored session and starts the orchestrator task.
    ///
    /// The returned handle already observes the restored (or welcomed)
    /// conversation. Must be called from within a Tokio runtime.
    pub fn spawn(self) -> OrchestratorHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let stored = self.store.load();
        let initial = OrchestratorState::new(
            stored.conversation,
            stored.language,
            stored.sound_enabled,
            self.recognizer.is_available(),
            self.synthesizer.is_available(),
        );
        let (state_tx, state_rx) = watch::channel(initial.clone());

        let mut runtime = Runtime {
            config: self.config,
            state: initial,
            store: self.store,
            gateway: self.gateway,
            capture: SpeechCapture::new(self.recognizer, capture_tx),
            playback: SpeechPlayback::new(self.synthesizer, playback_tx),
            replies_tx,
            state_tx,
            turn: 0,
            reply_task: None,
        };
        runtime.open();

        let inbox = Inbox {
            commands: commands_rx,
            capture: capture_rx,
            playback: playback_rx,
            replies: replies_rx,
        };
        let span = info_span!("orchestrator", context = %runtime.config.context);
        let task = tokio::spawn(runtime.run(inbox).instrument(span));

        OrchestratorHandle {
            commands: commands_tx,
            state: state_rx,
            task,
        }
    }
}

/// A host's connection to a running orchestrator.
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<OrchestratorState>,
    task: JoinHandle<()>,
}

/// Entry point for building orchestrators.
pub struct Orchestrator;

impl Orchestrator {
    pub fn builder(
        config: OrchestratorConfig,
        store: ConversationStore,
        gateway: CompletionGateway,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            store,
            gateway,
            recognizer: Arc::new(UnavailableRecognizer),
            synthesizer: Arc::new(SilentSynthesizer),
        }
    }
}

impl OrchestratorHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Orchestrator has stopped, dropping command");
        }
    }

    /// Submits `text` as the learner's next turn. Blank text and submissions
    /// made while a reply is pending are ignored.
    pub fn submit(&self, text: impl Into<String>) {
        self.send(Command::Submit(text.into()));
    }

    pub fn start_capture(&self) {
        self.send(Command::StartCapture);
    }

    pub fn stop_capture(&self) {
        self.send(Command::StopCapture);
    }

    pub fn toggle_language(&self) {
        self.send(Command::ToggleLanguage);
    }

    pub fn toggle_sound(&self) {
        self.send(Command::ToggleSound);
    }

    pub fn clear_history(&self) {
        self.send(Command::ClearHistory);
    }

    /// The most recently published state.
    pub fn snapshot(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.clone()
    }

    /// Stops the orchestrator, cancelling capture and playback, and waits for
    /// its task to finish. A pending reply is abandoned.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!(error = %e, "Orchestrator task ended abnormally");
        }
    }
}
