//! HTTP client for the chat completions endpoint.
//!
//! [`GroqClient`] speaks the OpenAI-compatible wire format in both delivery
//! modes. The [`CompletionBackend`] trait is the seam the
//! [`ChatCycle`](crate::chat::ChatCycle) depends on, so a cycle can run
//! against the real endpoint or a scripted backend in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::api::FragmentStream;
use crate::api::streaming::relay_sse_body;
use crate::config::ApiKey;
use crate::error::ChatError;
use crate::{ChatRequest, GROQ_URL, Message, UsageInfo};

/// Boxed future returned by [`CompletionBackend`] methods.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChatError>> + Send + 'a>>;

/// A remote (or scripted) source of assistant replies.
///
/// Both methods take the full request sequence: system prompt, priming
/// message, then the session's turns.
pub trait CompletionBackend: Send + Sync {
    /// Blocking mode: wait for the complete reply.
    fn complete<'a>(&'a self, model: &'a str, messages: &'a [Message])
    -> CompletionFuture<'a, String>;

    /// Streaming mode: return a stream of non-empty text fragments.
    ///
    /// Request-level failures (connection refused, non-2xx status) are
    /// returned here; failures after the stream started arrive as an `Err`
    /// item on the stream.
    fn stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> CompletionFuture<'a, FragmentStream>;
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error object the endpoint returns in place of a completion, both in a
/// plain response body and inside a stream.
#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorResponse {
    pub(crate) message: String,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Groq chat completions API.
///
/// Cheap to share: holds a pooled `reqwest::Client` and no per-session
/// state.
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    api_key: ApiKey,
    endpoint: String,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl GroqClient {
    /// Create a client for the public Groq endpoint.
    pub fn new(api_key: ApiKey) -> Result<Self, ChatError> {
        Self::with_endpoint(api_key, GROQ_URL)
    }

    /// Create a client for a custom OpenAI-compatible endpoint.
    pub fn with_endpoint(api_key: ApiKey, endpoint: impl Into<String>) -> Result<Self, ChatError> {
        // Streams can run for minutes, so only connecting is bounded.
        let client = reqwest::Client::builder()
            .user_agent(concat!("coding-buddy/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    /// The URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, ChatError> {
        debug!(
            "LLM request: model={}, messages={}, stream={}",
            body.model,
            body.messages.len(),
            body.stream,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Send a chat completion request and wait for the whole reply.
    pub async fn chat(&self, model: &str, messages: &[Message]) -> Result<String, ChatError> {
        let start = Instant::now();
        let resp = self
            .send(&ChatRequest {
                model,
                messages,
                stream: false,
            })
            .await?;

        let text = resp
            .text()
            .await
            .map_err(|e| ChatError::Request(format!("failed to read response: {e}")))?;
        debug!(
            "LLM response in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        parse_completion(&text)
    }

    /// Send a streaming chat completion request.
    ///
    /// The returned stream is fed by a spawned task that reads the response
    /// body incrementally; drop the stream to abandon the response.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, ChatError> {
        let resp = self
            .send(&ChatRequest {
                model,
                messages,
                stream: true,
            })
            .await?;

        let (sender, stream) = FragmentStream::channel();
        tokio::spawn(relay_sse_body(resp, sender));
        Ok(stream)
    }
}

/// Extract `choices[0].message.content` from a non-streaming response body.
fn parse_completion(body: &str) -> Result<String, ChatError> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| ChatError::Parse(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ChatError::Api(err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or(ChatError::EmptyResponse)?;
    if let Some(reason) = &choice.finish_reason {
        trace!("finish_reason: {reason}");
    }
    choice.message.content.ok_or(ChatError::EmptyResponse)
}

impl CompletionBackend for GroqClient {
    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> CompletionFuture<'a, String> {
        Box::pin(self.chat(model, messages))
    }

    fn stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [Message],
    ) -> CompletionFuture<'a, FragmentStream> {
        Box::pin(self.chat_stream(model, messages))
    }
}
