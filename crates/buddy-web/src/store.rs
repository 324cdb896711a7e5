//! Sessions created through the REST API.
//!
//! WebSocket sessions live and die with their connection; REST sessions need
//! an id to come back to. Each one sits behind its own async mutex, so
//! concurrent requests against one session run one cycle at a time while
//! different sessions proceed independently.
//!
//! A session nobody has touched for [`DEFAULT_IDLE_TIMEOUT`] is dropped the
//! next time a session is created, so clients that never call `DELETE` do
//! not grow the store without bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use buddy::session::ChatSession;
use tracing::info;

/// How long a REST session may sit unused before it is expired.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// A REST session handle.
pub type SharedSession = Arc<tokio::sync::Mutex<ChatSession>>;

/// Generate a unique session id.
///
/// Format: `ss-{timestamp_hex}-{counter}`.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ss-{ts:x}-{count:04x}")
}

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// Map of session id to session, shared by every REST handler.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Every update is a single insert, remove or timestamp, so poisoning
        // is harmless.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session seeded with `greeting` and return its id.
    ///
    /// Expires idle sessions first.
    pub fn create(&self, greeting: &str) -> (String, SharedSession) {
        let mut session = ChatSession::new();
        session.initialize(greeting);
        let id = generate_session_id();
        let shared = Arc::new(tokio::sync::Mutex::new(session));

        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_used.elapsed() < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            info!("Expired {expired} idle sessions");
        }
        sessions.insert(
            id.clone(),
            Entry {
                session: shared.clone(),
                last_used: Instant::now(),
            },
        );
        drop(sessions);

        info!("Session {id} created");
        (id, shared)
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// End a session. Returns `false` if no session had that id.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            info!("Session {id} ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
