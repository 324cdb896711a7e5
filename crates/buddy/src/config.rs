//! Configuration loading from an ordered list of secret sources.
//!
//! The API key and prompt strings can live in a dotenv file (local
//! development), a flat JSON file, or the process environment (what a
//! hosting platform's secret store ends up as). [`ConfigLoader`] tries its
//! sources in order and the first one that yields a non-empty
//! `GROQ_API_KEY` wins; the remaining keys are read from that same source.
//!
//! ```ignore
//! let config = ConfigLoader::standard(".env", "config.json").load()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{DEFAULT_MODEL, Message, MessageRole};

// ── Keys and defaults ──────────────────────────────────────────────

/// Required: the completion API key.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";
/// System prompt sent ahead of every conversation.
pub const SYSTEM_PROMPT_VAR: &str = "CHAT_CONTEXT";
/// Priming assistant message sent after the system prompt.
pub const PRIMING_MESSAGE_VAR: &str = "INITIAL_MSG";
/// Greeting that seeds every new session.
pub const GREETING_VAR: &str = "INITIAL_RESPONSE";
/// Model identifier override.
pub const MODEL_VAR: &str = "GROQ_MODEL";

const KNOWN_KEYS: [&str; 5] = [
    API_KEY_VAR,
    SYSTEM_PROMPT_VAR,
    PRIMING_MESSAGE_VAR,
    GREETING_VAR,
    MODEL_VAR,
];

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a world-leading expert on DSA.
This includes but is not limited to: all the leetcode problems.
You can prepare anyone for tech interviews in top tech companies.
And wrap numbers in proper markdown formatting (ex: `123`).
Provide the answers in an easier way.
Prefer dry-run with example while explaining any concept.
Always identify the common mistakes and how they could be resolved while providing solution hints.
Try to be a cheerful, excited and motivated assistant.
Only answer the question - do not return something dumb like \"[YourNextQuestion]\"";

pub const DEFAULT_PRIMING_MESSAGE: &str =
    "Hey there! I can explain everything in DSA to a five year old, Lets help you out!";

pub const DEFAULT_GREETING: &str = "\
I'm your DSA buddy, here to help you ace those tech interviews and conquer coding challenges!
Let's get started! What specific area would you like to explore today?
Do you want to:
- Discuss a particular problem or algorithm?
- Practice with code examples?
- Review common interview questions?
- Optimize your coding workflow?
Type away, and let's dive into the world of DSA together!";

/// Flat key/value view of one configuration source.
pub type Secrets = HashMap<String, String>;

// ── ApiKey ─────────────────────────────────────────────────────────

/// The completion API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// The raw key, for the transport layer's `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

// ── Page settings ──────────────────────────────────────────────────

/// Static text and icons for the chat page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageConfig {
    /// Browser tab title.
    pub page_title: String,
    /// Browser tab icon.
    pub page_icon: String,
    /// Heading shown above the conversation.
    pub title: String,
    pub caption: String,
    /// Placeholder text of the message input.
    pub input_placeholder: String,
    pub assistant_avatar: String,
    pub user_avatar: String,
    pub system_avatar: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_title: "My Coding Buddy".into(),
            page_icon: "🤖".into(),
            title: "Welcome Buddy🤓!".into(),
            caption: "Helping You Level Up Your Coding Game".into(),
            input_placeholder: "Ask me".into(),
            assistant_avatar: "🤖".into(),
            user_avatar: "🗨️".into(),
            system_avatar: "⚙️".into(),
        }
    }
}

impl PageConfig {
    /// Avatar shown next to a turn with the given role.
    pub fn avatar_for(&self, role: MessageRole) -> &str {
        match role {
            MessageRole::Assistant => &self.assistant_avatar,
            MessageRole::User => &self.user_avatar,
            MessageRole::System => &self.system_avatar,
        }
    }
}

// ── Config ─────────────────────────────────────────────────────────

/// Process-wide settings, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: ApiKey,
    pub system_prompt: String,
    pub priming_assistant_message: String,
    pub initial_greeting: String,
    pub model: String,
    pub page: PageConfig,
}

impl Config {
    /// Build a config from one source's key/value map.
    ///
    /// Returns `None` when the map has no usable API key. Prompt keys and
    /// the model fall back to the built-in defaults.
    pub fn from_secrets(secrets: &Secrets) -> Option<Self> {
        let api_key = secrets
            .get(API_KEY_VAR)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())?;

        let text = |key: &str, default: &str| {
            secrets
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Some(Self {
            api_key: ApiKey::new(api_key),
            system_prompt: text(SYSTEM_PROMPT_VAR, DEFAULT_SYSTEM_PROMPT),
            priming_assistant_message: text(PRIMING_MESSAGE_VAR, DEFAULT_PRIMING_MESSAGE),
            initial_greeting: text(GREETING_VAR, DEFAULT_GREETING),
            model: secrets
                .get(MODEL_VAR)
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            page: PageConfig::default(),
        })
    }

    /// Override the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The fixed turns sent ahead of every session's history.
    pub fn preamble(&self) -> [Message; 2] {
        [
            Message::system(&self.system_prompt),
            Message::assistant(&self.priming_assistant_message),
        ]
    }
}

// ── Sources ────────────────────────────────────────────────────────

/// A place configuration can be read from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A dotenv file (`KEY=value` lines). The process environment is left
    /// untouched.
    DotEnvFile(PathBuf),
    /// A flat JSON object; only string values are used.
    JsonFile(PathBuf),
    /// The process environment (deployment secret store).
    Environment,
    /// An in-memory map, for embedding and tests.
    Static { name: String, secrets: Secrets },
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::DotEnvFile(path) => write!(f, "dotenv file {}", path.display()),
            ConfigSource::JsonFile(path) => write!(f, "JSON file {}", path.display()),
            ConfigSource::Environment => write!(f, "process environment"),
            ConfigSource::Static { name, .. } => write!(f, "{name}"),
        }
    }
}

impl ConfigSource {
    /// Read every key/value pair this source provides.
    pub fn read(&self) -> Result<Secrets, String> {
        match self {
            ConfigSource::DotEnvFile(path) => read_dotenv(path),
            ConfigSource::JsonFile(path) => read_json(path),
            ConfigSource::Environment => Ok(KNOWN_KEYS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
                .collect()),
            ConfigSource::Static { secrets, .. } => Ok(secrets.clone()),
        }
    }
}

fn read_dotenv(path: &Path) -> Result<Secrets, String> {
    if !path.is_file() {
        return Err("file not found".into());
    }
    let iter = dotenvy::from_path_iter(path).map_err(|e| e.to_string())?;
    let mut secrets = Secrets::new();
    for item in iter {
        let (key, value) = item.map_err(|e| e.to_string())?;
        secrets.insert(key, value);
    }
    Ok(secrets)
}

fn read_json(path: &Path) -> Result<Secrets, String> {
    if !path.is_file() {
        return Err("file not found".into());
    }
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            _ => {
                debug!("Ignoring non-string config value for {key}");
                None
            }
        })
        .collect())
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why one source was passed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Configuration could not be loaded. The process cannot serve requests.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GROQ_API_KEY not found in any configuration source ({})", format_attempts(.attempts))]
    Exhausted { attempts: Vec<SourceAttempt> },
}

fn format_attempts(attempts: &[SourceAttempt]) -> String {
    if attempts.is_empty() {
        return "no sources configured".into();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Loader ─────────────────────────────────────────────────────────

/// Ordered list of configuration sources; first success wins.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard order: dotenv file, JSON file, then the environment.
    pub fn standard(dotenv: impl Into<PathBuf>, json: impl Into<PathBuf>) -> Self {
        Self::new()
            .with_source(ConfigSource::DotEnvFile(dotenv.into()))
            .with_source(ConfigSource::JsonFile(json.into()))
            .with_source(ConfigSource::Environment)
    }

    /// Append a source. Sources are tried in the order they were added.
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Try each source in order and build a [`Config`] from the first one
    /// that provides an API key.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut attempts = Vec::new();
        for source in &self.sources {
            let reason = match source.read() {
                Ok(secrets) => match Config::from_secrets(&secrets) {
                    Some(config) => {
                        info!("Loaded configuration from {source}");
                        return Ok(config);
                    }
                    None => format!("{API_KEY_VAR} missing or empty"),
                },
                Err(reason) => reason,
            };
            debug!("Skipping {source}: {reason}");
            attempts.push(SourceAttempt {
                source: source.to_string(),
                reason,
            });
        }
        Err(ConfigError::Exhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn secrets(pairs: &[(&str, &str)]) -> Secrets {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn from_secrets_requires_api_key() {
        assert!(Config::from_secrets(&secrets(&[])).is_none());
        assert!(Config::from_secrets(&secrets(&[(API_KEY_VAR, "  ")])).is_none());
    }

    #[test]
    fn from_secrets_falls_back_to_defaults() {
        let config = Config::from_secrets(&secrets(&[(API_KEY_VAR, "gsk_1")])).unwrap();
        assert_eq!(config.api_key.expose(), "gsk_1");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.priming_assistant_message, DEFAULT_PRIMING_MESSAGE);
        assert_eq!(config.initial_greeting, DEFAULT_GREETING);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn from_secrets_reads_all_keys() {
        let config = Config::from_secrets(&secrets(&[
            (API_KEY_VAR, "gsk_2"),
            (SYSTEM_PROMPT_VAR, "be brief"),
            (PRIMING_MESSAGE_VAR, "ready"),
            (GREETING_VAR, "hi!"),
            (MODEL_VAR, "llama-3.3-70b-versatile"),
        ]))
        .unwrap();
        assert_eq!(config.system_prompt, "be brief");
        assert_eq!(config.priming_assistant_message, "ready");
        assert_eq!(config.initial_greeting, "hi!");
        assert_eq!(config.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn preamble_is_system_then_priming() {
        let config = Config::from_secrets(&secrets(&[
            (API_KEY_VAR, "k"),
            (SYSTEM_PROMPT_VAR, "sys"),
            (PRIMING_MESSAGE_VAR, "prime"),
        ]))
        .unwrap();
        assert_eq!(
            config.preamble(),
            [Message::system("sys"), Message::assistant("prime")]
        );
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("gsk_very_secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        let config = Config::from_secrets(&secrets(&[(API_KEY_VAR, "gsk_very_secret")])).unwrap();
        assert!(!format!("{config:?}").contains("gsk_very_secret"));
    }

    #[test]
    fn dotenv_source_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            ".env",
            "GROQ_API_KEY=gsk_env\nINITIAL_RESPONSE=\"Hello from dotenv\"\n",
        );
        let config = ConfigLoader::new()
            .with_source(ConfigSource::DotEnvFile(path))
            .load()
            .unwrap();
        assert_eq!(config.api_key.expose(), "gsk_env");
        assert_eq!(config.initial_greeting, "Hello from dotenv");
    }

    #[test]
    fn json_source_ignores_non_string_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "config.json",
            r#"{"GROQ_API_KEY": "gsk_json", "INITIAL_MSG": 42, "CHAT_CONTEXT": "ctx"}"#,
        );
        let found = ConfigSource::JsonFile(path.clone()).read().unwrap();
        assert!(!found.contains_key(PRIMING_MESSAGE_VAR));

        let config = ConfigLoader::new()
            .with_source(ConfigSource::JsonFile(path))
            .load()
            .unwrap();
        assert_eq!(config.api_key.expose(), "gsk_json");
        assert_eq!(config.system_prompt, "ctx");
        assert_eq!(config.priming_assistant_message, DEFAULT_PRIMING_MESSAGE);
    }

    #[test]
    fn first_successful_source_wins() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv = write_file(&dir, ".env", "INITIAL_RESPONSE=no key here\n");
        let json = write_file(
            &dir,
            "config.json",
            r#"{"GROQ_API_KEY": "gsk_second", "INITIAL_RESPONSE": "from json"}"#,
        );
        let config = ConfigLoader::new()
            .with_source(ConfigSource::DotEnvFile(dotenv))
            .with_source(ConfigSource::JsonFile(json))
            .with_source(ConfigSource::Static {
                name: "third".into(),
                secrets: secrets(&[(API_KEY_VAR, "gsk_third")]),
            })
            .load()
            .unwrap();
        assert_eq!(config.api_key.expose(), "gsk_second");
        // Prompt keys come from the winning source only.
        assert_eq!(config.initial_greeting, "from json");
    }

    #[test]
    fn missing_key_everywhere_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_file(&dir, "config.json", "{not json");
        let err = ConfigLoader::new()
            .with_source(ConfigSource::DotEnvFile(dir.path().join("missing.env")))
            .with_source(ConfigSource::JsonFile(broken))
            .with_source(ConfigSource::Static {
                name: "secret store".into(),
                secrets: secrets(&[(GREETING_VAR, "hello")]),
            })
            .load()
            .unwrap_err();

        let ConfigError::Exhausted { attempts } = &err;
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].reason, "file not found");
        assert!(attempts[1].reason.starts_with("invalid JSON"));
        assert_eq!(attempts[2].source, "secret store");
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn empty_loader_reports_no_sources() {
        let err = ConfigLoader::new().load().unwrap_err();
        assert!(err.to_string().contains("no sources configured"));
    }

    #[test]
    fn standard_order() {
        let loader = ConfigLoader::standard(".env", "config.json");
        let names: Vec<String> = loader.sources().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "dotenv file .env",
                "JSON file config.json",
                "process environment"
            ]
        );
    }

    #[test]
    fn page_defaults_and_avatars() {
        let page = PageConfig::default();
        assert_eq!(page.title, "Welcome Buddy🤓!");
        assert_eq!(page.caption, "Helping You Level Up Your Coding Game");
        assert_eq!(page.avatar_for(MessageRole::Assistant), "🤖");
        assert_eq!(page.avatar_for(MessageRole::User), "🗨️");
    }
}
