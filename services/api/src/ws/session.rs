//! Manages the WebSocket connection lifecycle for one learner's conversation.

use super::{
    protocol::{ClientMessage, ServerMessage},
    remote_speech::{RemoteRecognizer, RemoteSynthesizer},
};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use tutor_core::{
    ConversationStore, FileBackend, KeyValueBackend, MemoryBackend, Orchestrator,
    OrchestratorConfig, OrchestratorHandle, RecognizerEvent, SynthesisEvent, Voice,
};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Everything the browser tells us in its `init` message.
#[derive(Debug)]
struct SessionInit {
    client_id: Uuid,
    context: String,
    speech_recognition: bool,
    speech_synthesis: bool,
    voices: Vec<Voice>,
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for the `init` handshake, mounts an orchestrator backed by the
/// client's stored conversation, then runs the session loop until the
/// browser goes away.
#[instrument(name = "ws_session", skip_all, fields(client_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection. Awaiting initialization...");
    let (mut socket_tx, mut socket_rx) = socket.split();

    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        Some(Err(e)) => Err(anyhow!(e)),
        None => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let init = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    tracing::Span::current().record("client_id", &init.client_id.to_string());

    let session_span = tracing::info_span!("conversation", client_id = %init.client_id, context = %init.context);
    if let Err(e) = run_session(state, socket_tx, socket_rx, init)
        .instrument(session_span)
        .await
    {
        error!(error = ?e, "Session terminated with error.");
    }
    info!("Session finished.");
}

fn parse_init(text: &str) -> Result<SessionInit> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init {
            client_id,
            context,
            speech_recognition,
            speech_synthesis,
            voices,
        } => Ok(SessionInit {
            client_id,
            context: context.trim().to_string(),
            speech_recognition,
            speech_synthesis,
            voices,
        }),
        _ => Err(anyhow!("First message must be `init`")),
    }
}

/// Opens durable storage for the client, falling back to memory so the
/// conversation still works when the data directory is unusable.
fn open_backend(state: &AppState, client_id: Uuid) -> Arc<dyn KeyValueBackend> {
    let dir = state.client_dir(&client_id.to_string());
    match FileBackend::open(&dir) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Falling back to in-memory storage");
            Arc::new(MemoryBackend::new())
        }
    }
}

/// The main event loop for an active conversation.
///
/// Listens for client messages, requests from the remote speech engines, and
/// orchestrator state changes, and forwards each to the right place.
async fn run_session(
    state: Arc<AppState>,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    init: SessionInit,
) -> Result<()> {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let recognizer = Arc::new(RemoteRecognizer::new(
        init.speech_recognition,
        outbound_tx.clone(),
    ));
    let synthesizer = Arc::new(RemoteSynthesizer::new(
        init.speech_synthesis,
        init.voices,
        outbound_tx,
    ));

    let store = ConversationStore::new(open_backend(&state, init.client_id));
    let config =
        OrchestratorConfig::new(init.context).with_languages(state.config.language_tags());
    let handle = Orchestrator::builder(config, store, state.gateway.clone())
        .with_recognizer(recognizer.clone())
        .with_synthesizer(synthesizer.clone())
        .spawn();

    let mut state_rx = handle.subscribe();
    let initial = state_rx.borrow_and_update().clone();
    info!(
        messages = initial.conversation.len(),
        capture = initial.capture_available,
        playback = initial.playback_available,
        "Conversation opened"
    );
    send_msg(&mut socket_tx, ServerMessage::State { state: initial }).await?;

    let outcome = loop {
        tokio::select! {
            // Handle messages from the client WebSocket.
            msg_result = socket_rx.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => dispatch(msg, &handle, &recognizer, &synthesizer),
                            Err(e) => warn!(error = %e, "Ignoring unparseable client message."),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed the connection.");
                        break Ok(());
                    }
                    Some(Ok(_)) => debug!("Ignoring non-text frame."),
                    Some(Err(e)) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break Ok(());
                    }
                }
            },
            // Requests issued by the remote speech engines.
            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = send_msg(&mut socket_tx, msg).await {
                    break Err(e);
                }
            },
            // Push every state change to the browser.
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break Err(anyhow!("Orchestrator stopped unexpectedly."));
                }
                let snapshot = state_rx.borrow_and_update().clone();
                if let Err(e) = send_msg(&mut socket_tx, ServerMessage::State { state: snapshot }).await {
                    break Err(e);
                }
            },
        }
    };

    handle.shutdown().await;
    info!("WebSocket connection closed and conversation shut down.");
    outcome
}

fn dispatch(
    msg: ClientMessage,
    handle: &OrchestratorHandle,
    recognizer: &RemoteRecognizer,
    synthesizer: &RemoteSynthesizer,
) {
    match msg {
        ClientMessage::Submit { text } => handle.submit(text),
        ClientMessage::StartCapture => handle.start_capture(),
        ClientMessage::StopCapture => handle.stop_capture(),
        ClientMessage::ToggleLanguage => handle.toggle_language(),
        ClientMessage::ToggleSound => handle.toggle_sound(),
        ClientMessage::ClearHistory => handle.clear_history(),
        ClientMessage::CaptureInterim { id, text } => {
            recognizer.deliver(id, RecognizerEvent::Interim(text))
        }
        ClientMessage::CaptureEnded { id } => recognizer.deliver(id, RecognizerEvent::Ended),
        ClientMessage::CaptureFailed { id, message } => {
            recognizer.deliver(id, RecognizerEvent::Failed(message))
        }
        ClientMessage::SpeechStarted { id } => synthesizer.deliver(id, SynthesisEvent::Started),
        ClientMessage::SpeechEnded { id } => synthesizer.deliver(id, SynthesisEvent::Ended),
        ClientMessage::SpeechFailed { id, message } => {
            synthesizer.deliver(id, SynthesisEvent::Failed(message))
        }
        ClientMessage::Init { .. } => warn!("Ignoring repeated `init` message."),
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
