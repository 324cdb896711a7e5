//! REST API endpoint handlers.
//!
//! These complement the WebSocket channel with blocking request/response
//! semantics: create a session, send a message, get the whole reply back.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use buddy::chat::{ChatCycle, DeliveryMode};
use buddy::config::PageConfig;
use buddy::error::ChatError;
use buddy::events::LoggingHandler;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;
use crate::snapshot::{SessionSnapshot, TurnView, turn_views};

/// Error response body: `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn session_not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("no session with id {id}"))
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// GET /api/page: Page settings.
pub async fn get_page(State(app): State<AppState>) -> Json<PageConfig> {
    Json(app.config.page.clone())
}

/// Response body for POST /api/sessions.
#[derive(Serialize)]
pub struct SessionCreated {
    pub id: String,
    pub turns: Vec<TurnView>,
}

/// POST /api/sessions: Create a session seeded with the greeting.
pub async fn create_session(State(app): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let (id, session) = app.sessions.create(&app.config.initial_greeting);
    let turns = turn_views(&*session.lock().await, &app.config.page);
    (StatusCode::CREATED, Json(SessionCreated { id, turns }))
}

/// GET /api/sessions/{id}: Session snapshot.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::session_not_found(&id))?;
    let snapshot = SessionSnapshot::from_session(&*session.lock().await, &app.config.page);
    Ok(Json(snapshot))
}

/// DELETE /api/sessions/{id}: End a session.
pub async fn delete_session(State(app): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if app.sessions.remove(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Request body for POST /api/sessions/{id}/chat.
#[derive(Deserialize)]
pub struct ChatBody {
    pub message: String,
}

/// Response body for POST /api/sessions/{id}/chat.
#[derive(Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub turns: Vec<TurnView>,
}

/// POST /api/sessions/{id}/chat: Run one blocking chat cycle.
///
/// Returns 400 for blank input, 404 for an unknown session and 502 when the
/// completion endpoint fails. A failed cycle still records the user turn.
pub async fn post_chat(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }
    let session = app
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::session_not_found(&id))?;
    let mut session = session.lock().await;

    let reply = ChatCycle::new(app.backend.as_ref(), &app.config)
        .with_event_handler(&LoggingHandler)
        .run(&mut session, &body.message, DeliveryMode::Blocking)
        .await
        .inspect_err(|e| warn!("Session {id}: {e}"))?;

    Ok(Json(ChatReply {
        reply,
        turns: turn_views(&session, &app.config.page),
    }))
}
