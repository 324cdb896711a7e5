//! WebSocket upgrade handler and per-connection chat sessions.
//!
//! Each connection gets its own [`SessionContext`]:
//! 1. A [`WsMessage::Snapshot`] with the page settings and greeting on
//!    connect.
//! 2. For every `{"type":"chat","message":"..."}` it receives, a streaming
//!    chat cycle whose events are relayed as [`WsMessage`] updates.
//!
//! Inbound messages are handled one at a time, so a session never runs two
//! cycles at once. The session is dropped when the socket closes.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use buddy::chat::{ChatCycle, DeliveryMode};
use buddy::config::Config;
use buddy::error::ChatError;
use buddy::events::{CompositeEventHandler, LoggingHandler};
use buddy::session::ChatSession;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::AppState;
use crate::relay::{RelayHandler, WsMessage};
use crate::snapshot::SessionSnapshot;
use crate::store::generate_session_id;

/// A message sent from a WebSocket client to the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Send a user message.
    Chat { message: String },
}

/// One interactive session: its turn history and its outbound channel.
pub struct SessionContext {
    id: String,
    session: ChatSession,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

impl SessionContext {
    /// Create a session seeded with the configured greeting.
    pub fn new(config: &Config, outbound: mpsc::UnboundedSender<WsMessage>) -> Self {
        let mut session = ChatSession::new();
        session.initialize(&config.initial_greeting);
        Self {
            id: generate_session_id(),
            session,
            outbound,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Queue the full snapshot for the client.
    pub fn send_snapshot(&self, config: &Config) -> bool {
        let data = SessionSnapshot::from_session(&self.session, &config.page).to_json();
        self.outbound.send(WsMessage::Snapshot { data }).is_ok()
    }

    /// Process one raw client message. Malformed messages and blank input
    /// are ignored.
    pub async fn handle_client_message(&mut self, text: &str, app: &AppState) {
        let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
            debug!("Ignoring malformed WebSocket message");
            return;
        };

        match msg {
            ClientMessage::Chat { message } => {
                if message.trim().is_empty() {
                    debug!("Ignoring blank chat message");
                    return;
                }
                self.chat(&message, app).await;
            }
        }
    }

    async fn chat(&mut self, message: &str, app: &AppState) {
        let handler = CompositeEventHandler::new()
            .with(LoggingHandler)
            .with(RelayHandler::new(self.outbound.clone()));

        let result = ChatCycle::new(app.backend.as_ref(), &app.config)
            .with_event_handler(&handler)
            .run(&mut self.session, message, DeliveryMode::Streaming)
            .await;

        match result {
            Ok(_) => {}
            Err(ChatError::Cancelled) => {
                info!("Session {}: client went away mid-reply", self.id);
            }
            Err(e) => debug!("Session {}: cycle failed: {e}", self.id),
        }
    }
}

/// GET /ws: WebSocket upgrade handler.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, app: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

    let mut context = SessionContext::new(&app.config, outbound_tx);
    info!("Session {} connected", context.id());
    context.send_snapshot(&app.config);

    // Writer task: the only place that touches the sink. Ends when the
    // context is dropped or the client stops accepting frames.
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if ws_send(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => context.handle_client_message(&text, &app).await,
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    info!(
        "Session {} disconnected after {} turns",
        context.id(),
        context.session().len()
    );
    drop(context);
    forward_task.abort();
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
