//! Events and handlers for a [`ChatCycle`](crate::chat::ChatCycle).
//!
//! A cycle reports what it is doing through [`ChatEvent`] variants: the
//! user turn being recorded, phase changes, each text fragment as it
//! arrives, the finished assistant turn, or a failure. Front-ends implement
//! [`ChatEventHandler`] to render these progressively.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or blocking calls where only the result matters |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, trace, warn};

use crate::Message;
use crate::chat::CyclePhase;
use crate::error::ChatError;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by a chat cycle, in order.
#[derive(Debug)]
pub enum ChatEvent<'a> {
    /// The user's message was appended to the session.
    UserTurn(&'a Message),
    /// The cycle entered a new phase.
    Phase(CyclePhase),
    /// A non-empty text fragment of the in-flight reply.
    Fragment(&'a str),
    /// The reply finished and was appended to the session.
    AssistantTurn(&'a Message),
    /// The request or stream failed. The session keeps the user turn.
    Failed(&'a ChatError),
}

/// Feedback from a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    /// Stop consuming the reply (the consumer has gone away). The cycle
    /// drops the fragment stream and returns [`ChatError::Cancelled`].
    Stop,
}

/// Handler for chat cycle events.
///
/// Return `None` to keep going. The default implementation ignores every
/// event.
///
/// ```ignore
/// struct Printer;
///
/// impl ChatEventHandler for Printer {
///     fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
///         if let ChatEvent::Fragment(text) = event {
///             print!("{text}");
///         }
///         None
///     }
/// }
/// ```
pub trait ChatEventHandler: Send + Sync {
    fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
        let _ = event;
        None
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl ChatEventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ChatEvent<'_>) -> Option<EventResponse> + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ChatEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ChatEventHandler for FnEventHandler<F>
where
    F: Fn(&ChatEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
        (self.0)(event)
    }
}

/// Dispatches each event to several handlers in registration order.
///
/// Every handler sees every event; the first non-`None` response is
/// returned.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(relay);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn ChatEventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl ChatEventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
        let mut first = None;
        for handler in &self.handlers {
            let response = handler.on_event(event);
            if first.is_none() {
                first = response;
            }
        }
        first
    }
}

/// Logs chat events through `tracing`.
pub struct LoggingHandler;

fn preview(text: &str) -> String {
    let head: String = text.chars().take(200).collect();
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        head
    }
}

impl ChatEventHandler for LoggingHandler {
    fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
        match event {
            ChatEvent::UserTurn(turn) => {
                debug!("User: {}", preview(&turn.content));
            }
            ChatEvent::Phase(phase) => {
                trace!("Chat phase: {phase}");
            }
            ChatEvent::Fragment(text) => {
                trace!("Fragment: {} bytes", text.len());
            }
            ChatEvent::AssistantTurn(turn) => {
                info!("Assistant replied ({} chars)", turn.content.chars().count());
                debug!("Assistant: {}", preview(&turn.content));
            }
            ChatEvent::Failed(err) => {
                warn!("Chat cycle failed: {err}");
            }
        }
        None
    }
}
