//! What gets written to the session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifies one chat session across the log.
///
/// Displays as a UUID string; CLI commands reference sessions by any
/// unambiguous prefix of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0.to_string().starts_with(prefix)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Which side of the conversation a logged message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One thing that happened during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Message {
        role: Role,
        content: String,
    },
    /// The model requested a tool and it was routed to a server.
    ToolCall {
        /// The model's tool_use id, correlating the result.
        id: String,
        /// The server that owns the tool.
        server: String,
        name: String,
        input: Value,
    },
    /// A dispatched tool came back.
    ToolResult {
        id: String,
        name: String,
        output: Value,
        is_error: bool,
    },
    SessionStart,
    SessionEnd,
}

/// An [`EventKind`] stamped with its session and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn message(session_id: SessionId, role: Role, content: impl Into<String>) -> Self {
        Self::new(
            session_id,
            EventKind::Message {
                role,
                content: content.into(),
            },
        )
    }

    pub fn tool_call(
        session_id: SessionId,
        id: impl Into<String>,
        server: impl Into<String>,
        name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::new(
            session_id,
            EventKind::ToolCall {
                id: id.into(),
                server: server.into(),
                name: name.into(),
                input,
            },
        )
    }

    pub fn tool_result(
        session_id: SessionId,
        id: impl Into<String>,
        name: impl Into<String>,
        output: Value,
        is_error: bool,
    ) -> Self {
        Self::new(
            session_id,
            EventKind::ToolResult {
                id: id.into(),
                name: name.into(),
                output,
                is_error,
            },
        )
    }
}
