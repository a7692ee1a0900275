//! The SQLite store behind the session log.

use crate::{Error, Event, EventKind, Result, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// Append-only event log in a single SQLite table.
///
/// The `kind` column duplicates the tag inside the JSON payload so
/// queries can filter without parsing it.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open the log at `path`, creating the file and schema on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// A log that lives and dies with the process. Used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, timestamp);
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Append one event.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                kind_tag(&event.kind),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Everything that happened in one session, oldest first.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Like [`load_session`](Self::load_session), optionally restricted
    /// to one kind tag (`message`, `tool_call`, `tool_result`, ...).
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY timestamp",
        )?;

        let rows = stmt.query_map(params![session_id.to_string(), kind], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, timestamp, data) = row?;
            events.push(Event {
                id: id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("event id {id:?}: {e}")))?,
                session_id: session_id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("session id {session_id:?}: {e}")))?,
                timestamp: parse_timestamp(&timestamp)?,
                kind: serde_json::from_str(&data)
                    .map_err(|e| Error::Corrupt(format!("event payload: {e}")))?,
            });
        }

        Ok(events)
    }

    /// One summary row per recorded session, most recent first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id,
                    MIN(timestamp),
                    MAX(CASE WHEN kind = 'session_end' THEN timestamp END),
                    SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END)
             FROM events GROUP BY session_id ORDER BY MIN(timestamp) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, started, ended, messages) = row?;
            summaries.push(SessionSummary {
                id: id
                    .parse()
                    .map_err(|e| Error::Corrupt(format!("session id {id:?}: {e}")))?,
                started_at: parse_timestamp(&started)?,
                ended_at: ended.as_deref().map(parse_timestamp).transpose()?,
                message_count: messages.max(0) as usize,
            });
        }

        Ok(summaries)
    }
}

/// One row of `switchboard sessions`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: usize,
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    text.parse()
        .map_err(|e| Error::Corrupt(format!("timestamp {text:?}: {e}")))
}

fn kind_tag(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Message { .. } => "message",
        EventKind::ToolCall { .. } => "tool_call",
        EventKind::ToolResult { .. } => "tool_result",
        EventKind::SessionStart => "session_start",
        EventKind::SessionEnd => "session_end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use serde_json::json;

    #[test]
    fn append_then_load_round_trips() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();

        store
            .append(&Event::new(session, EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::message(session, Role::User, "hello"))
            .unwrap();

        let events = store.load_session(session).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::SessionStart));
        assert!(matches!(
            &events[1].kind,
            EventKind::Message { role: Role::User, content } if content == "hello"
        ));
    }

    #[test]
    fn kind_filter_restricts_results() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();

        store
            .append(&Event::message(session, Role::User, "q"))
            .unwrap();
        store
            .append(&Event::tool_call(
                session,
                "tu_1",
                "wikipedia",
                "search_articles",
                json!({"topic": "rust"}),
            ))
            .unwrap();

        let calls = store.load_events(session, Some("tool_call")).unwrap();
        assert_eq!(calls.len(), 1);

        let all = store.load_events(session, None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn tool_result_keeps_its_error_flag() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();

        store
            .append(&Event::tool_result(
                session,
                "tu_1",
                "lookup",
                json!("no such page"),
                true,
            ))
            .unwrap();

        let events = store.load_session(session).unwrap();
        assert!(matches!(
            &events[0].kind,
            EventKind::ToolResult { is_error: true, .. }
        ));
    }

    #[test]
    fn sessions_are_summarized_with_message_counts() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();

        store
            .append(&Event::new(session, EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::message(session, Role::User, "hi"))
            .unwrap();
        store
            .append(&Event::message(session, Role::Assistant, "hello"))
            .unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session);
        assert_eq!(sessions[0].message_count, 2);
        assert!(sessions[0].ended_at.is_none());

        store
            .append(&Event::new(session, EventKind::SessionEnd))
            .unwrap();
        let sessions = store.list_sessions().unwrap();
        assert!(sessions[0].ended_at.is_some());
    }
}
