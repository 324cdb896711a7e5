//! Browser-based chat UI for the coding buddy.
//!
//! `buddy-web` serves a single chat page, a WebSocket endpoint that streams
//! assistant replies fragment by fragment, and a small REST API for
//! blocking request/response chats.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use buddy::prelude::*;
//! use buddy_web::{WebConfig, spawn_web};
//!
//! let config = Arc::new(ConfigLoader::standard(".env", "config.json").load()?);
//! let client = Arc::new(GroqClient::new(config.api_key.clone())?);
//!
//! let addr = spawn_web(client, config, WebConfig::default()).await;
//! println!("Chat UI: http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! browser ──{"type":"chat"}──▶ /ws ── SessionContext ── ChatCycle ──▶ completion API
//!    ▲                                      │
//!    └──── WsMessage (text_delta, text) ◀── RelayHandler
//! ```
//!
//! Every WebSocket connection owns one [`SessionContext`](ws::SessionContext):
//! its own turn history and its own outbound channel. Sessions are never
//! shared and end when the socket closes. REST sessions live in a
//! [`SessionStore`] until deleted or left idle.

mod api;
pub mod relay;
mod server;
pub mod snapshot;
pub mod store;
pub mod ws;

pub use relay::{RelayHandler, WsMessage};
pub use snapshot::{SessionSnapshot, TurnView};
pub use store::SessionStore;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use buddy::client::CompletionBackend;
use buddy::config::Config;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:8501`.
    pub bind_addr: SocketAddr,
    /// Directory of static files served instead of the built-in page.
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            static_dir: None,
        }
    }
}

/// State shared by every handler: the completion backend and the read-only
/// configuration, plus the REST session store.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn CompletionBackend>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: Arc<Config>) -> Self {
        Self {
            backend,
            config,
            sessions: SessionStore::default(),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    backend: Arc<dyn CompletionBackend>,
    config: Arc<Config>,
    web: WebConfig,
) -> SocketAddr {
    let router = server::build_router(AppState::new(backend, config), web.static_dir);
    server::start_server(router, web.bind_addr).await
}
