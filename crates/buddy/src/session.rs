//! Per-session turn history.

use crate::Message;
use crate::config::Config;

/// The ordered, append-only sequence of turns of one conversation.
///
/// Each connected client owns its own session; sessions never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    turns: Vec<Message>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an empty session with the assistant greeting.
    ///
    /// Does nothing if the session already has turns or the greeting is
    /// empty, so calling it on every page load is safe.
    pub fn initialize(&mut self, greeting: &str) {
        if self.turns.is_empty() && !greeting.is_empty() {
            self.turns.push(Message::assistant(greeting));
        }
    }

    /// Add a turn to the end of the history.
    pub fn append(&mut self, turn: Message) {
        self.turns.push(turn);
    }

    /// Every turn, oldest first.
    pub fn all(&self) -> &[Message] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The full request sequence: system prompt, priming message, then
    /// every turn of this session.
    pub fn request_messages(&self, config: &Config) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.turns.len() + 2);
        messages.extend(config.preamble());
        messages.extend(self.turns.iter().cloned());
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{API_KEY_VAR, Secrets};

    fn config() -> Config {
        let secrets: Secrets = [
            (API_KEY_VAR.to_string(), "k".to_string()),
            ("CHAT_CONTEXT".to_string(), "sys".to_string()),
            ("INITIAL_MSG".to_string(), "prime".to_string()),
        ]
        .into_iter()
        .collect();
        Config::from_secrets(&secrets).unwrap()
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut session = ChatSession::new();
        session.initialize("Hello!");
        session.initialize("Hello!");
        session.initialize("Something else");
        assert_eq!(session.all(), [Message::assistant("Hello!")]);
    }

    #[test]
    fn initialize_skips_non_empty_sessions() {
        let mut session = ChatSession::new();
        session.append(Message::user("first"));
        session.initialize("Hello!");
        assert_eq!(session.len(), 1);
        assert_eq!(session.last(), Some(&Message::user("first")));
    }

    #[test]
    fn empty_greeting_seeds_nothing() {
        let mut session = ChatSession::new();
        session.initialize("");
        assert!(session.is_empty());
    }

    #[test]
    fn append_preserves_insertion_order() {
        let mut session = ChatSession::new();
        session.initialize("greeting");
        let inputs = ["a", "b", "c"];
        for input in inputs {
            session.append(Message::user(input));
            session.append(Message::assistant(format!("re: {input}")));
        }
        let contents: Vec<&str> = session.all().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            ["greeting", "a", "re: a", "b", "re: b", "c", "re: c"]
        );
    }

    #[test]
    fn request_messages_prepend_preamble() {
        let mut session = ChatSession::new();
        session.append(Message::user("2+2?"));
        assert_eq!(
            session.request_messages(&config()),
            vec![
                Message::system("sys"),
                Message::assistant("prime"),
                Message::user("2+2?"),
            ]
        );
    }
}
