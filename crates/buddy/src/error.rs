//! Errors raised while talking to the completion endpoint.

use thiserror::Error;

/// A failed completion request or broken response stream.
///
/// None of these are retried; the chat cycle surfaces them to the user as a
/// failed turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// The request never got a response (DNS, connect, TLS, ...).
    #[error("request failed: {0}")]
    Request(String),
    /// The endpoint answered with a non-success status.
    #[error("completion API HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The endpoint answered 2xx but reported an error object.
    #[error("completion API error: {0}")]
    Api(String),
    /// The response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),
    /// The response carried no assistant text.
    #[error("empty response from completion API")]
    EmptyResponse,
    /// The stream broke after it had started.
    #[error("stream interrupted: {0}")]
    Stream(String),
    /// The consumer stopped reading before the reply finished.
    #[error("response cancelled by the client")]
    Cancelled,
}

impl ChatError {
    /// Short message suitable for showing in the chat UI.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Http { status, .. } => {
                format!("The assistant is unavailable right now (HTTP {status}).")
            }
            ChatError::Cancelled => "The response was cancelled.".to_string(),
            other => format!("The assistant could not answer: {other}"),
        }
    }
}
