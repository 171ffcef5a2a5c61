use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value as Json;

use crate::error::Result;

/// A single persisted turn in a session's history.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
    pub metadata: Json,
}

impl Message {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let metadata_raw: String = row.get(6)?;
        Ok(Message {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            token_count: row.get(4)?,
            created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(Json::Object(Default::default())),
        })
    }
}

/// Handle onto one session's slice of the `messages` table.
#[derive(Clone)]
pub struct ConversationLog {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) session_id: String,
}

impl ConversationLog {
    pub fn add(&self, role: &str, content: &str, token_count: u32, metadata: Option<Json>) -> Result<Message> {
        let now = Utc::now();
        let metadata = metadata.unwrap_or(Json::Object(Default::default()));
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (session_id, role, content, token_count, created_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![self.session_id, role, content, token_count, now.to_rfc3339(), metadata.to_string()],
        )?;
        Ok(Message {
            id: conn.last_insert_rowid(),
            session_id: self.session_id.clone(),
            role: role.to_string(),
            content: content.to_string(),
            token_count,
            created_at: now,
            metadata,
        })
    }

    pub fn get_all(&self) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM messages WHERE session_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![self.session_id], Message::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recent `limit` messages, returned oldest-first.
    pub fn get_recent(&self, limit: u32) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM messages WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2")?;
        let mut rows: Vec<Message> =
            stmt.query_map(params![self.session_id, limit], Message::from_row)?.collect::<rusqlite::Result<_>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Messages that fit within `max_tokens`, filled from most recent
    /// backwards; system messages are always kept regardless of budget.
    /// Returned oldest-first.
    pub fn get_by_token_budget(&self, max_tokens: u32) -> Result<Vec<Message>> {
        let all = self.get_all()?;
        let mut result = Vec::new();
        let mut total = 0u32;
        for message in all.into_iter().rev() {
            if total + message.token_count <= max_tokens {
                total += message.token_count;
                result.push(message);
            } else if message.role == "system" {
                total += message.token_count;
                result.push(message);
            }
        }
        result.reverse();
        Ok(result)
    }

    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: u32 =
            conn.query_row("SELECT COUNT(*) FROM messages WHERE session_id = ?1", params![self.session_id], |r| {
                r.get(0)
            })?;
        Ok(count)
    }

    /// Deletes this session's messages. When `keep_system` is set, system
    /// messages survive the clear. Returns the number of rows removed.
    pub fn clear(&self, keep_system: bool) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let changed = if keep_system {
            conn.execute(
                "DELETE FROM messages WHERE session_id = ?1 AND role != 'system'",
                params![self.session_id],
            )?
        } else {
            conn.execute("DELETE FROM messages WHERE session_id = ?1", params![self.session_id])?
        };
        Ok(changed as u32)
    }

    pub fn get_total_tokens(&self) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let total: Option<u32> = conn.query_row(
            "SELECT SUM(token_count) FROM messages WHERE session_id = ?1",
            params![self.session_id],
            |r| r.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }
}
