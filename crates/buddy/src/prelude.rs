//! Convenience re-exports for common `buddy` types.
//!
//! ```ignore
//! use buddy::prelude::*;
//! ```
//!
//! Covers what a front-end needs to run a chat: configuration, sessions,
//! the client, the chat cycle and event handlers. Wire-level SSE helpers
//! stay in [`api`](crate::api).

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatError, Message, MessageRole};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{ApiKey, Config, ConfigError, ConfigLoader, ConfigSource, PageConfig};

// ── Client ──────────────────────────────────────────────────────────
pub use crate::api::FragmentStream;
pub use crate::client::{CompletionBackend, CompletionFuture, GroqClient};

// ── Sessions and cycles ─────────────────────────────────────────────
pub use crate::chat::{ChatCycle, CyclePhase, DeliveryMode};
pub use crate::events::{
    ChatEvent, ChatEventHandler, CompositeEventHandler, EventResponse, FnEventHandler,
    LoggingHandler, NoopHandler,
};
pub use crate::session::ChatSession;
