//! Chat-completion client and session runtime for the coding buddy.
//!
//! `buddy` holds everything between a chat front-end and the hosted
//! [Groq](https://groq.com/) chat completions API (OpenAI-compatible wire
//! format): configuration loading, per-session turn history, the completion
//! client in blocking and streaming mode, and the [`ChatCycle`](chat::ChatCycle)
//! that ties one user message to one assistant reply.
//!
//! # Getting started
//!
//! ```ignore
//! use buddy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::standard(".env", "config.json").load()?;
//!     let client = GroqClient::new(config.api_key.clone())?;
//!
//!     let mut session = ChatSession::new();
//!     session.initialize(&config.initial_greeting);
//!
//!     let reply = ChatCycle::new(&client, &config)
//!         .with_event_handler(&LoggingHandler)
//!         .run(&mut session, "2+2?", DeliveryMode::Streaming)
//!         .await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Ordered configuration sources, [`Config`](config::Config), page settings |
//! | [`session`] | Append-only [`ChatSession`](session::ChatSession) turn history |
//! | [`client`] | [`GroqClient`](client::GroqClient) and the [`CompletionBackend`](client::CompletionBackend) seam |
//! | [`api`] | SSE parsing and the [`FragmentStream`](api::FragmentStream) channel |
//! | [`chat`] | One request/response cycle over a session |
//! | [`events`] | [`ChatEvent`](events::ChatEvent) and event handlers |
//! | [`error`] | [`ChatError`](error::ChatError) |

pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod prelude;
pub mod session;

use serde::{Deserialize, Serialize};

pub use client::{CompletionBackend, CompletionFuture, GroqClient};
pub use error::ChatError;

// ── Constants ──────────────────────────────────────────────────────

pub const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default model for all completion calls.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

// ── Message types ──────────────────────────────────────────────────

/// Role of a turn in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Assistant,
    User,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::Assistant => "assistant",
            MessageRole::User => "user",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in the conversation.
///
/// Turns are never edited after creation; a session only ever appends them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}
