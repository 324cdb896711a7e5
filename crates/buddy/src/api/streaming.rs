//! Server-Sent Events (SSE) streaming for the chat completions API.
//!
//! The endpoint answers a `stream: true` request with lines of the form
//! `data: {json}` and a final `data: [DONE]`. Each JSON chunk may carry a
//! text delta in `choices[0].delta.content`; many carry only metadata (role
//! announcements, finish reasons, usage) and are skipped. A chunk holding an
//! `error` object ends the stream with [`ChatError::Api`].
//!
//! Fragments travel from a producer task to the caller over a bounded
//! channel: [`FragmentSender`] on the producer side, [`FragmentStream`] on
//! the consumer side. Dropping the stream stops the producer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::UsageInfo;
use crate::client::ApiErrorResponse;
use crate::error::ChatError;

/// Fragments buffered between the network task and a slow consumer.
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

// ── Chunk types ────────────────────────────────────────────────────

/// Raw SSE data chunk from the completions API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
    x_groq: Option<GroqExtension>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Groq reports usage for streamed responses under `x_groq.usage`.
#[derive(Deserialize, Debug)]
struct GroqExtension {
    usage: Option<UsageInfo>,
}

/// Parse a single SSE `data:` payload and return its text delta.
///
/// Returns `Ok(None)` for chunks without textual content: no choices, no
/// delta, a `null` or empty `content`, or JSON that does not parse. A chunk
/// carrying an `error` object is returned as [`ChatError::Api`].
pub fn parse_sse_data(data: &str) -> Result<Option<String>, ChatError> {
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e} (data: {data})");
            return Ok(None);
        }
    };

    if let Some(err) = chunk.error {
        return Err(ChatError::Api(err.message));
    }

    if let Some(usage) = chunk.usage.or(chunk.x_groq.and_then(|x| x.usage)) {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let Some(choice) = chunk.choices.and_then(|c| c.into_iter().next()) else {
        return Ok(None);
    };
    if let Some(reason) = &choice.finish_reason {
        trace!("Stream finish_reason: {reason}");
    }
    Ok(choice
        .delta
        .and_then(|d| d.content)
        .filter(|content| !content.is_empty()))
}

// ── Line splitting ─────────────────────────────────────────────────

/// One classified line of an SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// A `data:` payload (the JSON chunk, prefix stripped).
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
    /// A blank line, a `:` comment or a field we don't use (`event:`, `id:`).
    Skip,
}

impl SseLine {
    fn classify(raw: &str) -> Self {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(':') {
            return SseLine::Skip;
        }
        match line.strip_prefix("data:") {
            Some(data) => {
                let data = data.trim_start();
                if data == "[DONE]" {
                    SseLine::Done
                } else {
                    SseLine::Data(data.to_string())
                }
            }
            None => SseLine::Skip,
        }
    }
}

/// Splits an SSE body into lines as network chunks arrive.
///
/// Buffers raw bytes rather than decoded text so a multi-byte UTF-8
/// character split across two network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(SseLine::classify(&String::from_utf8_lossy(&line)));
        }
        lines
    }

    /// Classify whatever is left once the body has ended (a final line
    /// without a trailing newline).
    pub fn finish(self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        match SseLine::classify(&String::from_utf8_lossy(&self.buffer)) {
            SseLine::Skip => None,
            line => Some(line),
        }
    }
}

// ── Fragment channel ───────────────────────────────────────────────

/// Producer half of a fragment channel.
///
/// Every backend sends through this type, so the "only non-empty text
/// fragments are forwarded" rule holds no matter where fragments come from.
#[derive(Debug, Clone)]
pub struct FragmentSender {
    tx: mpsc::Sender<Result<String, ChatError>>,
}

impl FragmentSender {
    /// Forward a fragment if it carries text.
    ///
    /// `None` and empty strings are dropped silently. Returns
    /// [`ChatError::Cancelled`] once the consumer has gone away; the producer
    /// should stop at that point.
    pub async fn send(&self, fragment: Option<String>) -> Result<(), ChatError> {
        match fragment {
            Some(text) if !text.is_empty() => self
                .tx
                .send(Ok(text))
                .await
                .map_err(|_| ChatError::Cancelled),
            _ => {
                trace!("Skipping fragment without text");
                if self.tx.is_closed() {
                    Err(ChatError::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Report a mid-stream failure. The consumer sees it as the last item.
    pub async fn fail(&self, error: ChatError) {
        let _ = self.tx.send(Err(error)).await;
    }

    /// Whether the consumer has dropped its [`FragmentStream`].
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has dropped its [`FragmentStream`].
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Consumer half of a fragment channel: a finite, non-restartable sequence of
/// non-empty text fragments in arrival order.
///
/// Ends when the producer finishes (remote stream closed) or after yielding
/// one `Err` item. Implements [`Stream`], and [`next_fragment`](Self::next_fragment)
/// is available for plain `while let` loops.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<Result<String, ChatError>>,
    finished: bool,
}

impl FragmentStream {
    /// Create a connected sender/stream pair with the default capacity.
    pub fn channel() -> (FragmentSender, FragmentStream) {
        Self::with_capacity(FRAGMENT_CHANNEL_CAPACITY)
    }

    /// Create a connected sender/stream pair buffering up to `capacity`
    /// fragments.
    pub fn with_capacity(capacity: usize) -> (FragmentSender, FragmentStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            FragmentSender { tx },
            FragmentStream {
                rx,
                finished: false,
            },
        )
    }

    /// Wait for the next fragment. `None` once the stream has ended.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ChatError>> {
        if self.finished {
            return None;
        }
        let item = self.rx.recv().await;
        self.observe(&item);
        item
    }

    fn observe(&mut self, item: &Option<Result<String, ChatError>>) {
        if matches!(item, None | Some(Err(_))) {
            self.finished = true;
            self.rx.close();
        }
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(item) => {
                self.observe(&item);
                Poll::Ready(item)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ── Producer ───────────────────────────────────────────────────────

/// Read an SSE response body chunk by chunk and relay its text deltas.
///
/// Stops at `data: [DONE]`, at the end of the body, when the body breaks
/// (forwarded as [`ChatError::Stream`]), when a chunk reports an error
/// (forwarded as [`ChatError::Api`]), or as soon as the consumer drops its
/// stream. Dropping `resp` on return closes the connection.
pub(crate) async fn relay_sse_body(mut resp: reqwest::Response, sender: FragmentSender) {
    let mut lines = SseLineBuffer::new();
    let mut forwarded = 0usize;

    loop {
        let chunk = tokio::select! {
            _ = sender.closed() => {
                debug!("Stream consumer went away after {forwarded} fragments");
                return;
            }
            chunk = resp.chunk() => chunk,
        };

        let bytes = match chunk {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                warn!("Stream broke after {forwarded} fragments: {e}");
                sender.fail(ChatError::Stream(e.to_string())).await;
                return;
            }
        };

        for line in lines.push(&bytes) {
            match line {
                SseLine::Done => {
                    debug!("Stream completed with {forwarded} fragments");
                    return;
                }
                SseLine::Data(data) => {
                    let fragment = match parse_sse_data(&data) {
                        Ok(fragment) => fragment,
                        Err(e) => {
                            warn!("Stream reported an error after {forwarded} fragments: {e}");
                            sender.fail(e).await;
                            return;
                        }
                    };
                    let has_text = fragment.is_some();
                    if sender.send(fragment).await.is_err() {
                        debug!("Stream consumer went away after {forwarded} fragments");
                        return;
                    }
                    if has_text {
                        forwarded += 1;
                    }
                }
                SseLine::Skip => {}
            }
        }
    }

    if let Some(SseLine::Data(data)) = lines.finish() {
        match parse_sse_data(&data) {
            Ok(fragment) => {
                let _ = sender.send(fragment).await;
            }
            Err(e) => {
                warn!("Stream reported an error after {forwarded} fragments: {e}");
                sender.fail(e).await;
                return;
            }
        }
    }
    debug!("Stream body ended with {forwarded} fragments");
}
