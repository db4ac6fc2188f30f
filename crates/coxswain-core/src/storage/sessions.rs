//! Conversation persistence.
//!
//! Each store instance owns one session row; messages append with a
//! monotonic sequence so transcripts reload in order.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::agent::hooks::MessageSink;
use crate::error::AgentError;
use crate::models::message::{Message, Role, ToolCall};

/// Summary of a stored session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub working_directory: String,
    pub message_count: i64,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
    session_id: String,
}

impl SessionStore {
    /// Open (or create) the session database at `path` and start a new
    /// session rooted at `working_directory`.
    pub fn open(path: impl AsRef<Path>, working_directory: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, working_directory)
    }

    /// In-memory store for tests and ephemeral agents
    pub fn open_in_memory(working_directory: &str) -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, working_directory)
    }

    fn with_connection(conn: Connection, working_directory: &str) -> Result<Self, AgentError> {
        Self::init_schema(&conn)?;

        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO sessions (id, working_directory, created_at, last_active, message_count)
             VALUES (?1, ?2, ?3, ?3, 0)",
            params![session_id, working_directory, now],
        )?;
        debug!(session_id = %session_id, working_directory, "Created session");

        Ok(Self {
            conn: Mutex::new(conn),
            session_id,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                working_directory TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                message_count INTEGER DEFAULT 0,
                metadata TEXT
            );
            CREATE TABLE IF NOT EXISTS session_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT,
                tool_call_id TEXT,
                name TEXT,
                thinking TEXT,
                tool_calls TEXT,
                sequence INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );
            CREATE INDEX IF NOT EXISTS idx_session_messages
                ON session_messages(session_id, sequence);
            CREATE INDEX IF NOT EXISTS idx_session_last_active
                ON sessions(last_active DESC);",
        )?;
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a message to this store's session.
    ///
    /// Also bumps the session's message count and last-active time.
    pub async fn save_message(&self, message: &Message) -> Result<(), AgentError> {
        let conn = self.conn.lock().await;

        let sequence: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM session_messages WHERE session_id = ?1",
            params![self.session_id],
            |row| row.get(0),
        )?;

        let tool_calls = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO session_messages
                (session_id, role, content, tool_call_id, name, thinking, tool_calls, sequence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                self.session_id,
                message.role.as_str(),
                message.content,
                message.tool_call_id,
                message.name,
                message.thinking,
                tool_calls,
                sequence,
                now,
            ],
        )?;

        conn.execute(
            "UPDATE sessions SET message_count = message_count + 1, last_active = ?1 WHERE id = ?2",
            params![now, self.session_id],
        )?;
        Ok(())
    }

    /// Load a session's transcript in insertion order
    pub async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT role, content, tool_call_id, name, thinking, tool_calls
             FROM session_messages WHERE session_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![session_id], MessageRow::read)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.into_message()?);
        }
        Ok(messages)
    }

    /// Look up a stored session's summary row
    pub async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, AgentError> {
        let conn = self.conn.lock().await;
        let info = conn
            .query_row(
                "SELECT id, working_directory, message_count FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionInfo {
                        id: row.get(0)?,
                        working_directory: row.get(1)?,
                        message_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}

#[async_trait::async_trait]
impl MessageSink for SessionStore {
    async fn persist(&self, message: &Message) -> anyhow::Result<()> {
        Ok(self.save_message(message).await?)
    }
}

struct MessageRow {
    role: String,
    content: Option<String>,
    tool_call_id: Option<String>,
    name: Option<String>,
    thinking: Option<String>,
    tool_calls: Option<String>,
}

impl MessageRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            role: row.get("role")?,
            content: row.get("content")?,
            tool_call_id: row.get("tool_call_id")?,
            name: row.get("name")?,
            thinking: row.get("thinking")?,
            tool_calls: row.get("tool_calls")?,
        })
    }

    fn into_message(self) -> Result<Message, AgentError> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| AgentError::CorruptRecord(format!("unknown role '{}'", self.role)))?;

        let tool_calls: Option<Vec<ToolCall>> = self
            .tool_calls
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Message {
            role,
            content: self.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: self.tool_call_id,
            name: self.name,
            thinking: self.thinking,
        })
    }
}
