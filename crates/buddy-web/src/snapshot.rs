//! Serializable projection of a session for WebSocket and REST transport.
//!
//! Each turn carries its own role and the avatar for that role, so the page
//! renders assistant and user bubbles as they actually are.

use buddy::MessageRole;
use buddy::config::PageConfig;
use buddy::session::ChatSession;
use serde::Serialize;

/// One rendered message bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnView {
    pub role: MessageRole,
    pub avatar: String,
    pub content: String,
}

/// Page settings plus the full history of one session.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub page: PageConfig,
    pub turns: Vec<TurnView>,
}

impl SessionSnapshot {
    pub fn from_session(session: &ChatSession, page: &PageConfig) -> Self {
        Self {
            page: page.clone(),
            turns: turn_views(session, page),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Every turn of `session` in insertion order, tagged with its avatar.
pub fn turn_views(session: &ChatSession, page: &PageConfig) -> Vec<TurnView> {
    session
        .all()
        .iter()
        .map(|turn| TurnView {
            role: turn.role,
            avatar: page.avatar_for(turn.role).to_string(),
            content: turn.content.clone(),
        })
        .collect()
}
