use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;

use crate::error::Result;

/// A conversation session: a durable container for messages and the token
/// usage they accrued. Session ids are the first 8 hex characters of a
/// freshly generated UUID — short enough to type in a CLI, long enough that
/// collisions within one store are not a practical concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub codebase_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub metadata: Json,
}

impl Session {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let metadata_raw: String = row.get(5)?;
        Ok(Session {
            id: row.get(0)?,
            name: row.get(1)?,
            codebase_path: row.get(2)?,
            created_at: parse_timestamp(row.get::<_, String>(3)?),
            last_accessed: parse_timestamp(row.get::<_, String>(4)?),
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(Json::Object(Default::default())),
        })
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Handle onto the `sessions` table, sharing a connection with
/// [`crate::ConversationLog`] and the token ledger tables in the same store.
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn create(&self, name: Option<String>, codebase_path: Option<String>, metadata: Option<Json>) -> Result<Session> {
        let now = Utc::now();
        let name = name.unwrap_or_else(|| format!("Session {}", now.format("%Y-%m-%d %H:%M")));
        let session = Session {
            id: new_session_id(),
            name,
            codebase_path,
            created_at: now,
            last_accessed: now,
            metadata: metadata.unwrap_or(Json::Object(Default::default())),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, name, codebase_path, created_at, last_accessed, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.name,
                session.codebase_path,
                session.created_at.to_rfc3339(),
                session.last_accessed.to_rfc3339(),
                session.metadata.to_string(),
            ],
        )?;
        Ok(session)
    }

    /// Loads a session by id and bumps `last_accessed` to now.
    pub fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        let found: Option<Session> = conn
            .query_row("SELECT * FROM sessions WHERE id = ?1", params![session_id], Session::from_row)
            .optional()?;
        let Some(mut session) = found else {
            return Ok(None);
        };
        let now = Utc::now();
        conn.execute("UPDATE sessions SET last_accessed = ?1 WHERE id = ?2", params![now.to_rfc3339(), session_id])?;
        session.last_accessed = now;
        Ok(Some(session))
    }

    pub fn list_all(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY last_accessed DESC")?;
        let rows = stmt.query_map([], Session::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_recent(&self, limit: u32) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY last_accessed DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], Session::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(changed > 0)
    }

    pub fn update(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET name = ?1, codebase_path = ?2, last_accessed = ?3, metadata = ?4 WHERE id = ?5",
            params![
                session.name,
                session.codebase_path,
                session.last_accessed.to_rfc3339(),
                session.metadata.to_string(),
                session.id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path().join("sessions.db")).unwrap()
    }

    #[test]
    fn create_assigns_an_eight_char_id() {
        let store = temp_store();
        let session = store.sessions().create(None, None, None).unwrap();
        assert_eq!(session.id.len(), 8);
    }

    #[test]
    fn load_bumps_last_accessed() {
        let store = temp_store();
        let created = store.sessions().create(Some("demo".into()), None, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let loaded = store.sessions().load(&created.id).unwrap().unwrap();
        assert!(loaded.last_accessed >= created.last_accessed);
    }

    #[test]
    fn load_missing_session_returns_none() {
        let store = temp_store();
        assert!(store.sessions().load("deadbeef").unwrap().is_none());
    }

    #[test]
    fn delete_removes_session_and_cascades_messages() {
        let store = temp_store();
        let session = store.sessions().create(None, None, None).unwrap();
        store.conversation(&session.id).add("user", "hi", 0, None).unwrap();
        assert!(store.sessions().delete(&session.id).unwrap());
        assert_eq!(store.conversation(&session.id).count().unwrap(), 0);
    }

    #[test]
    fn list_all_orders_by_last_accessed_desc() {
        let store = temp_store();
        let a = store.sessions().create(Some("a".into()), None, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let b = store.sessions().create(Some("b".into()), None, None).unwrap();
        let all = store.sessions().list_all().unwrap();
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);
    }
}
