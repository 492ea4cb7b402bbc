//! Conversation memory.
//!
//! Each session owns one [`Memory`]: an ordered, append-only transcript of
//! completed turns. Only the user message and the final assistant answer of a
//! turn are kept; tool calls live in the per-turn scratchpad.

use crate::llm::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A message in the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    position: u64,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Position in the session transcript, starting at 0. Never reused, even
    /// after older messages are evicted.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(self.content.clone()),
            Role::Assistant => ChatMessage::assistant(self.content.clone()),
            Role::System => ChatMessage::system(self.content.clone()),
        }
    }
}

/// How much of the transcript a session keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Keep every turn for the life of the session.
    #[default]
    Unbounded,
    /// Keep the most recent `max_turns` turns.
    SlidingWindow { max_turns: usize },
}

impl Retention {
    /// Build from the optional `agent.memory_max_turns` setting.
    pub fn from_max_turns(max_turns: Option<usize>) -> Self {
        match max_turns {
            Some(max_turns) => Retention::SlidingWindow { max_turns },
            None => Retention::Unbounded,
        }
    }
}

/// Ordered transcript of completed turns.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: VecDeque<Message>,
    next_position: u64,
    retention: Retention,
}

impl Memory {
    /// Create an empty, unbounded memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty memory with the given retention policy.
    pub fn with_retention(retention: Retention) -> Self {
        Self {
            retention,
            ..Default::default()
        }
    }

    /// Record a completed turn: the user message followed by the answer.
    pub fn record_turn(&mut self, user: &str, assistant: &str) {
        self.push(Role::User, user);
        self.push(Role::Assistant, assistant);
        self.apply_retention();
    }

    fn push(&mut self, role: Role, content: &str) {
        self.messages.push_back(Message {
            role,
            content: content.to_string(),
            position: self.next_position,
            created_at: Utc::now(),
        });
        self.next_position += 1;
    }

    fn apply_retention(&mut self) {
        if let Retention::SlidingWindow { max_turns } = self.retention {
            let max_messages = max_turns * 2;
            while self.messages.len() > max_messages {
                self.messages.pop_front();
            }
        }
    }

    /// Messages in transcript order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message. Positions keep counting from where they were.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The transcript as model request messages.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }
}

/// A conversation: an id and the memory that belongs to it.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    pub memory: Memory,
}

impl Session {
    /// Start a new session with a fresh id.
    pub fn new(retention: Retention) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: Memory::with_retention(retention),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Default cap on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Default idle time after which a session is dropped.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    session: Arc<tokio::sync::Mutex<Session>>,
    last_used: Instant,
}

/// Sessions held by the HTTP server, keyed by id.
///
/// Each session sits behind its own lock, so turns within a session run one
/// at a time while different sessions proceed independently. Ids are always
/// minted here. Idle sessions expire, and when the store is full the least
/// recently used session is evicted.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    retention: Retention,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retention,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: DEFAULT_SESSION_IDLE,
        }
    }

    /// Bound the number of live sessions and how long they may sit idle.
    pub fn with_limits(mut self, max_sessions: usize, idle_timeout: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.idle_timeout = idle_timeout;
        self
    }

    /// Look up a live session by id. An absent, unknown or expired id starts
    /// a new session under a fresh id.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> Arc<tokio::sync::Mutex<Session>> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < self.idle_timeout);
        if sessions.len() < before {
            debug!("Expired {} idle sessions", before - sessions.len());
        }

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_used = now;
                return entry.session.clone();
            }
            debug!("Unknown session {}, starting a new one", id);
        }

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                debug!("Session limit reached, evicting {}", oldest);
                sessions.remove(&oldest);
            }
        }

        let session = Session::new(self.retention);
        let id = session.id();
        let session = Arc::new(tokio::sync::Mutex::new(session));
        sessions.insert(
            id,
            SessionEntry {
                session: session.clone(),
                last_used: now,
            },
        );
        session
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
