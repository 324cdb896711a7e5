//! [`ChatEventHandler`] that turns chat events into WebSocket messages.
//!
//! [`RelayHandler`] maps each [`ChatEvent`] to a [`WsMessage`] and pushes it
//! onto its session's outbound channel. Once the socket writer has gone away
//! the channel is closed and the handler answers [`EventResponse::Stop`], so
//! the chat cycle stops consuming the reply.

use buddy::chat::CyclePhase;
use buddy::events::{ChatEvent, ChatEventHandler, EventResponse};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// A message sent from the server to a WebSocket client.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Page settings and the full history (sent on connect).
    Snapshot { data: serde_json::Value },
    /// The user's message was recorded.
    UserMessage { message: String },
    /// The session's cycle phase changed.
    Phase { phase: CyclePhase },
    /// Streaming text fragment of the in-flight reply.
    TextDelta { delta: String },
    /// The complete assistant reply.
    Text { text: String },
    /// The reply failed.
    Error { message: String },
}

impl WsMessage {
    fn from_event(event: &ChatEvent<'_>) -> Self {
        match event {
            ChatEvent::UserTurn(turn) => WsMessage::UserMessage {
                message: turn.content.clone(),
            },
            ChatEvent::Phase(phase) => WsMessage::Phase { phase: *phase },
            ChatEvent::Fragment(text) => WsMessage::TextDelta {
                delta: text.to_string(),
            },
            ChatEvent::AssistantTurn(turn) => WsMessage::Text {
                text: turn.content.clone(),
            },
            ChatEvent::Failed(err) => WsMessage::Error {
                message: err.user_message(),
            },
        }
    }
}

/// Relays chat events to one session's socket writer.
#[derive(Clone)]
pub struct RelayHandler {
    outbound: mpsc::UnboundedSender<WsMessage>,
}

impl RelayHandler {
    pub fn new(outbound: mpsc::UnboundedSender<WsMessage>) -> Self {
        Self { outbound }
    }
}

impl ChatEventHandler for RelayHandler {
    fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
        if self.outbound.send(WsMessage::from_event(event)).is_err() {
            debug!("Socket writer gone, stopping relay");
            return Some(EventResponse::Stop);
        }
        None
    }
}
