//! One user message in, one assistant reply out.
//!
//! [`ChatCycle`] appends the user's turn, sends the whole conversation to a
//! [`CompletionBackend`], relays the reply to a [`ChatEventHandler`] as it
//! arrives and appends the finished assistant turn. A session moves through
//! `idle → awaiting_response → streaming → complete → idle`; there is no
//! user-initiated cancellation, but a handler can stop consumption when its
//! client disconnects.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Message;
use crate::client::CompletionBackend;
use crate::config::Config;
use crate::error::ChatError;
use crate::events::{ChatEvent, ChatEventHandler, EventResponse, NoopHandler};
use crate::session::ChatSession;

/// Where a session is in its request/response cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    AwaitingResponse,
    Streaming,
    Complete,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::AwaitingResponse => "awaiting_response",
            CyclePhase::Streaming => "streaming",
            CyclePhase::Complete => "complete",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the assistant reply is delivered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Wait for the complete reply.
    Blocking,
    /// Relay the reply fragment by fragment.
    #[default]
    Streaming,
}

/// Runs chat cycles against a backend with a fixed configuration.
pub struct ChatCycle<'a> {
    backend: &'a dyn CompletionBackend,
    config: &'a Config,
    handler: &'a dyn ChatEventHandler,
}

impl<'a> ChatCycle<'a> {
    pub fn new(backend: &'a dyn CompletionBackend, config: &'a Config) -> Self {
        Self {
            backend,
            config,
            handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn ChatEventHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Run one cycle and return the assistant's reply.
    ///
    /// On failure the user turn stays in `session` with no matching
    /// assistant turn. If the handler answers [`EventResponse::Stop`] the
    /// reply is abandoned and [`ChatError::Cancelled`] is returned.
    pub async fn run(
        &self,
        session: &mut ChatSession,
        user_input: &str,
        mode: DeliveryMode,
    ) -> Result<String, ChatError> {
        session.append(Message::user(user_input));
        let announced = match session.last() {
            Some(turn) => self.emit(&ChatEvent::UserTurn(turn)),
            None => Ok(()),
        };
        let result = match announced {
            Ok(()) => self.respond(session, mode).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(reply) => {
                session.append(Message::assistant(reply.clone()));
                if let Some(turn) = session.last() {
                    // The turn is recorded; a late Stop changes nothing.
                    let _ = self.handler.on_event(&ChatEvent::AssistantTurn(turn));
                }
                let _ = self.handler.on_event(&ChatEvent::Phase(CyclePhase::Complete));
                let _ = self.handler.on_event(&ChatEvent::Phase(CyclePhase::Idle));
                Ok(reply)
            }
            Err(err) => {
                if matches!(err, ChatError::Cancelled) {
                    debug!("Chat cycle cancelled by consumer");
                } else {
                    let _ = self.handler.on_event(&ChatEvent::Failed(&err));
                }
                let _ = self.handler.on_event(&ChatEvent::Phase(CyclePhase::Idle));
                Err(err)
            }
        }
    }

    async fn respond(&self, session: &ChatSession, mode: DeliveryMode) -> Result<String, ChatError> {
        self.emit(&ChatEvent::Phase(CyclePhase::AwaitingResponse))?;
        let messages = session.request_messages(self.config);
        let model = self.config.model.as_str();

        let reply = match mode {
            DeliveryMode::Blocking => {
                let reply = self.backend.complete(model, &messages).await?;
                if !reply.is_empty() {
                    self.emit(&ChatEvent::Fragment(&reply))?;
                }
                reply
            }
            DeliveryMode::Streaming => {
                let mut stream = self.backend.stream(model, &messages).await?;
                self.emit(&ChatEvent::Phase(CyclePhase::Streaming))?;
                let mut reply = String::new();
                while let Some(fragment) = stream.next_fragment().await {
                    let fragment = fragment?;
                    self.emit(&ChatEvent::Fragment(&fragment))?;
                    reply.push_str(&fragment);
                }
                reply
            }
        };

        if reply.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(reply)
    }

    fn emit(&self, event: &ChatEvent<'_>) -> Result<(), ChatError> {
        match self.handler.on_event(event) {
            Some(EventResponse::Stop) => Err(ChatError::Cancelled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FragmentStream;
    use crate::client::CompletionFuture;
    use crate::config::{API_KEY_VAR, Secrets};
    use crate::events::FnEventHandler;
    use crate::MessageRole;
    use std::sync::Mutex;

    /// Replays a fixed list of raw fragments in either delivery mode.
    struct ScriptedBackend {
        fragments: Vec<Option<&'static str>>,
        fail_status: Option<u16>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedBackend {
        fn replying(fragments: &[Option<&'static str>]) -> Self {
            Self {
                fragments: fragments.to_vec(),
                fail_status: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Self::replying(&[])
            }
        }

        fn check(&self, messages: &[Message]) -> Result<(), ChatError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            match self.fail_status {
                Some(status) => Err(ChatError::Http {
                    status,
                    body: "scripted failure".into(),
                }),
                None => Ok(()),
            }
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn complete<'a>(
            &'a self,
            _model: &'a str,
            messages: &'a [Message],
        ) -> CompletionFuture<'a, String> {
            Box::pin(async move {
                self.check(messages)?;
                Ok(self.fragments.iter().flatten().copied().collect())
            })
        }

        fn stream<'a>(
            &'a self,
            _model: &'a str,
            messages: &'a [Message],
        ) -> CompletionFuture<'a, FragmentStream> {
            Box::pin(async move {
                self.check(messages)?;
                let (tx, stream) = FragmentStream::channel();
                let fragments = self.fragments.clone();
                tokio::spawn(async move {
                    for fragment in fragments {
                        if tx.send(fragment.map(String::from)).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(stream)
            })
        }
    }

    fn config() -> Config {
        let secrets: Secrets = [
            (API_KEY_VAR, "k"),
            ("CHAT_CONTEXT", "sys"),
            ("INITIAL_MSG", "prime"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Config::from_secrets(&secrets).unwrap()
    }

    /// Records every event as a short string.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl ChatEventHandler for Recorder {
        fn on_event(&self, event: &ChatEvent<'_>) -> Option<EventResponse> {
            let entry = match event {
                ChatEvent::UserTurn(m) => format!("user:{}", m.content),
                ChatEvent::Phase(p) => format!("phase:{p}"),
                ChatEvent::Fragment(f) => format!("fragment:{f}"),
                ChatEvent::AssistantTurn(m) => format!("assistant:{}", m.content),
                ChatEvent::Failed(_) => "failed".to_string(),
            };
            self.log.lock().unwrap().push(entry);
            None
        }
    }

    #[tokio::test]
    async fn blocking_cycle_appends_both_turns() {
        let backend = ScriptedBackend::replying(&[Some("4")]);
        let config = config();
        let mut session = ChatSession::new();

        let reply = ChatCycle::new(&backend, &config)
            .run(&mut session, "2+2?", DeliveryMode::Blocking)
            .await
            .unwrap();

        assert_eq!(reply, "4");
        assert_eq!(
            session.all(),
            [Message::user("2+2?"), Message::assistant("4")]
        );
        let requests = backend.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            vec![
                Message::system("sys"),
                Message::assistant("prime"),
                Message::user("2+2?"),
            ]
        );
    }

    #[tokio::test]
    async fn streaming_cycle_relays_only_text_fragments() {
        let backend = ScriptedBackend::replying(&[Some("Hel"), Some("lo"), None, Some(" there")]);
        let config = config();
        let handler = Recorder::default();
        let mut session = ChatSession::new();

        let reply = ChatCycle::new(&backend, &config)
            .with_event_handler(&handler)
            .run(&mut session, "hi", DeliveryMode::Streaming)
            .await
            .unwrap();

        assert_eq!(reply, "Hello there");
        assert_eq!(session.last(), Some(&Message::assistant("Hello there")));
        assert_eq!(
            handler.entries(),
            vec![
                "user:hi",
                "phase:awaiting_response",
                "phase:streaming",
                "fragment:Hel",
                "fragment:lo",
                "fragment: there",
                "assistant:Hello there",
                "phase:complete",
                "phase:idle",
            ]
        );
    }

    #[tokio::test]
    async fn streaming_concatenation_matches_blocking_reply() {
        let script = [Some("The "), None, Some("answer"), Some(""), Some(" is 4.")];
        let config = config();

        let mut blocking = ChatSession::new();
        let backend = ScriptedBackend::replying(&script);
        let full = ChatCycle::new(&backend, &config)
            .run(&mut blocking, "q", DeliveryMode::Blocking)
            .await
            .unwrap();

        let mut streaming = ChatSession::new();
        let streamed = ChatCycle::new(&backend, &config)
            .run(&mut streaming, "q", DeliveryMode::Streaming)
            .await
            .unwrap();

        assert_eq!(full, streamed);
        assert_eq!(blocking, streaming);
    }

    #[tokio::test]
    async fn failure_keeps_user_turn_without_reply() {
        let backend = ScriptedBackend::failing(503);
        let config = config();
        let handler = Recorder::default();
        let mut session = ChatSession::new();
        session.initialize("Hello!");

        for mode in [DeliveryMode::Blocking, DeliveryMode::Streaming] {
            let err = ChatCycle::new(&backend, &config)
                .with_event_handler(&handler)
                .run(&mut session, "help", mode)
                .await
                .unwrap_err();
            assert!(matches!(err, ChatError::Http { status: 503, .. }));
        }

        let roles: Vec<MessageRole> = session.all().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::Assistant, MessageRole::User, MessageRole::User]
        );
        let log = handler.entries();
        assert_eq!(log.iter().filter(|e| *e == "failed").count(), 2);
        assert_eq!(log.last().map(String::as_str), Some("phase:idle"));
    }

    #[tokio::test]
    async fn stop_response_cancels_without_reply() {
        let backend = ScriptedBackend::replying(&[Some("a"), Some("b"), Some("c")]);
        let config = config();
        let failed = Mutex::new(false);
        let handler = FnEventHandler::new(|event| match event {
            ChatEvent::Fragment(_) => Some(EventResponse::Stop),
            ChatEvent::Failed(_) => {
                *failed.lock().unwrap() = true;
                None
            }
            _ => None,
        });
        let mut session = ChatSession::new();

        let err = ChatCycle::new(&backend, &config)
            .with_event_handler(&handler)
            .run(&mut session, "go", DeliveryMode::Streaming)
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Cancelled));
        assert_eq!(session.all(), [Message::user("go")]);
        assert!(!*failed.lock().unwrap());
    }

    #[tokio::test]
    async fn stop_on_user_turn_still_returns_to_idle() {
        let backend = ScriptedBackend::replying(&[Some("never sent")]);
        let config = config();
        let log = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            log.lock().unwrap().push(format!("{event:?}"));
            match event {
                ChatEvent::UserTurn(_) => Some(EventResponse::Stop),
                _ => None,
            }
        });
        let mut session = ChatSession::new();

        let err = ChatCycle::new(&backend, &config)
            .with_event_handler(&handler)
            .run(&mut session, "bye", DeliveryMode::Streaming)
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Cancelled));
        assert_eq!(session.all(), [Message::user("bye")]);
        assert!(backend.requests.lock().unwrap().is_empty());
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[1].contains("Idle"));
    }

    #[tokio::test]
    async fn reply_without_text_is_an_error() {
        let backend = ScriptedBackend::replying(&[None, Some("")]);
        let config = config();
        let mut session = ChatSession::new();

        let err = ChatCycle::new(&backend, &config)
            .run(&mut session, "?", DeliveryMode::Streaming)
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::EmptyResponse));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn phase_wire_names() {
        assert_eq!(
            serde_json::to_value(CyclePhase::AwaitingResponse).unwrap(),
            "awaiting_response"
        );
        assert_eq!(CyclePhase::Complete.to_string(), "complete");
        assert_eq!(DeliveryMode::default(), DeliveryMode::Streaming);
    }
}
