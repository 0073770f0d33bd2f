//! The orchestrator's event loop.
//!
//! One task owns the conversation state. Host commands, capture updates,
//! playback updates and settled replies all arrive on channels and are
//! handled one at a time, so no transition is ever re-entered.

use super::{Command, OrchestratorConfig, state::OrchestratorState};
use crate::{
    error::CaptureError,
    fallback::welcome_message,
    gateway::{CompletionGateway, CompletionRequest, Reply},
    message::{Language, Message},
    prompts::build_system_prompt,
    skill::{SkillTag, classify_with_active},
    speech::{CaptureUpdate, PlaybackUpdate, RecognizerEvent, SpeechCapture, SpeechPlayback},
    store::ConversationStore,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// A reply that came back from the gateway for turn `turn`.
#[derive(Debug)]
pub(super) struct SettledReply {
    pub turn: u64,
    pub skill: SkillTag,
    pub reply: Reply,
}

/// Receiving ends of every channel the loop listens on.
pub(super) struct Inbox {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub capture: mpsc::UnboundedReceiver<CaptureUpdate>,
    pub playback: mpsc::UnboundedReceiver<PlaybackUpdate>,
    pub replies: mpsc::UnboundedReceiver<SettledReply>,
}

pub(super) struct Runtime {
    pub config: OrchestratorConfig,
    pub state: OrchestratorState,
    pub store: ConversationStore,
    pub gateway: CompletionGateway,
    pub capture: SpeechCapture,
    pub playback: SpeechPlayback,
    pub replies_tx: mpsc::UnboundedSender<SettledReply>,
    pub state_tx: watch::Sender<OrchestratorState>,
    /// Incremented per submitted turn; replies for older turns are discarded.
    pub turn: u64,
    pub reply_task: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Seeds the welcome message if the restored conversation is empty.
    pub fn open(&mut self) {
        if self.state.conversation.is_empty() {
            self.state.conversation.push(welcome_message(&self.config.context));
            self.store.save(&self.state.conversation);
        }
        self.publish();
    }

    pub async fn run(mut self, mut inbox: Inbox) {
        info!(messages = self.state.conversation.len(), "Orchestrator running");
        loop {
            tokio::select! {
                command = inbox.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(update) = inbox.capture.recv() => self.on_capture(update),
                Some(update) = inbox.playback.recv() => self.on_playback(update),
                Some(settled) = inbox.replies.recv() => self.on_reply(settled),
            }
        }
        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Handling command");
        match command {
            Command::Submit(text) => self.submit(&text),
            Command::StartCapture => self.start_capture(),
            Command::StopCapture => self.stop_capture(),
            Command::ToggleLanguage => self.toggle_language(),
            Command::ToggleSound => self.toggle_sound(),
            Command::ClearHistory => self.clear_history(),
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty submission");
            return;
        }
        if self.state.is_awaiting_reply {
            debug!("Reply still pending, ignoring submission");
            return;
        }

        let classification = classify_with_active(text, self.state.active_skill);
        if classification.should_switch() && classification.skill != self.state.active_skill {
            info!(
                from = %self.state.active_skill,
                to = %classification.skill,
                confidence = classification.confidence,
                "Switching persona"
            );
            self.state.active_skill = classification.skill;
        }
        let skill = self.state.active_skill;

        let respond_in = match self.state.language {
            Language::Primary => None,
            Language::Secondary => Some(self.config.languages.display_name(Language::Secondary)),
        };
        let system_prompt = build_system_prompt(skill, &self.config.context, respond_in.as_deref());
        let request = CompletionRequest::new(system_prompt, &self.state.conversation, text);

        self.state.conversation.push(Message::user(text, skill));
        self.store.save(&self.state.conversation);
        self.state.pending_input.clear();
        self.state.is_awaiting_reply = true;
        self.publish();

        self.abandon_reply_task();
        self.turn += 1;
        let turn = self.turn;
        let gateway = self.gateway.clone();
        let context = self.config.context.clone();
        let replies = self.replies_tx.clone();
        info!(turn, %skill, "Requesting reply");
        self.reply_task = Some(tokio::spawn(async move {
            let reply = gateway.complete(&request, skill, &context).await;
            // The loop may already be gone; the reply is then discarded.
            let _ = replies.send(SettledReply { turn, skill, reply });
        }));
    }

    fn on_reply(&mut self, settled: SettledReply) {
        if settled.turn != self.turn || !self.state.is_awaiting_reply {
            debug!(turn = settled.turn, current = self.turn, "Discarding reply for abandoned turn");
            return;
        }
        self.reply_task = None;

        let message = Message::assistant(
            settled.reply.content,
            settled.reply.content_secondary,
            settled.skill,
        );
        let language = self.state.language;
        let spoken = message.text_for(language).to_string();
        self.state.conversation.push(message);
        self.store.save(&self.state.conversation);
        self.state.is_awaiting_reply = false;
        info!(turn = settled.turn, source = ?settled.reply.source, "Reply settled");

        let lang = self.config.languages.tag(language).to_string();
        if let Err(e) = self.playback.speak(&spoken, &lang, self.state.sound_enabled) {
            warn!(error = %e, "Could not speak reply");
        }
        self.state.is_speaking = self.playback.is_speaking();
        self.publish();
    }

    fn start_capture(&mut self) {
        let lang = self.config.languages.tag(self.state.language).to_string();
        match self.capture.start(&lang) {
            Ok(true) => {
                self.state.is_capturing = true;
                self.publish();
            }
            Ok(false) => {}
            Err(CaptureError::Unavailable) => {
                info!("Speech capture unavailable, continuing text-only");
                self.state.capture_available = false;
                self.state.is_capturing = false;
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "Could not start speech capture");
                self.state.is_capturing = false;
                self.publish();
            }
        }
    }

    fn stop_capture(&mut self) {
        if self.capture.stop() {
            self.state.is_capturing = false;
            self.publish();
        }
    }

    fn on_capture(&mut self, update: CaptureUpdate) {
        match self.capture.apply(update) {
            Some(RecognizerEvent::Interim(transcript)) => {
                self.state.pending_input = transcript;
            }
            Some(RecognizerEvent::Ended) => {
                debug!(chars = self.state.pending_input.len(), "Capture ended, transcript ready");
            }
            Some(RecognizerEvent::Failed(_)) => {}
            None => return,
        }
        self.state.is_capturing = self.capture.is_capturing();
        self.publish();
    }

    fn on_playback(&mut self, update: PlaybackUpdate) {
        if self.playback.apply(update) {
            self.state.is_speaking = self.playback.is_speaking();
            self.publish();
        }
    }

    fn toggle_language(&mut self) {
        self.state.language = self.state.language.toggled();
        self.store.save_language(self.state.language);
        info!(language = ?self.state.language, "Language toggled");
        self.publish();
    }

    fn toggle_sound(&mut self) {
        self.state.sound_enabled = !self.state.sound_enabled;
        self.store.save_sound_enabled(self.state.sound_enabled);
        if !self.state.sound_enabled {
            self.playback.cancel();
            self.state.is_speaking = false;
        }
        info!(sound_enabled = self.state.sound_enabled, "Sound toggled");
        self.publish();
    }

    fn clear_history(&mut self) {
        self.store.clear();
        self.playback.cancel();
        self.state.is_speaking = false;
        if self.state.is_awaiting_reply {
            // Abandon the in-flight turn; a reply already queued is discarded.
            self.abandon_reply_task();
            self.turn += 1;
            self.state.is_awaiting_reply = false;
        }
        self.state.conversation = vec![welcome_message(&self.config.context)];
        info!("Conversation cleared");
        self.publish();
    }

    fn teardown(&mut self) {
        self.capture.shutdown();
        self.playback.cancel();
        self.state.is_capturing = false;
        self.state.is_speaking = false;
        if self.reply_task.take().is_some() {
            debug!("Leaving in-flight completion to finish unobserved");
        }
        self.publish();
        info!("Orchestrator stopped");
    }

    /// Aborts the outstanding completion call, if any.
    fn abandon_reply_task(&mut self) {
        if let Some(task) = self.reply_task.take() {
            if !task.is_finished() {
                debug!(turn = self.turn, "Aborting in-flight completion");
            }
            task.abort();
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}
