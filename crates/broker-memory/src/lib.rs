mod conversation;
mod error;
mod schema;
mod session;

pub use conversation::{ConversationLog, Message};
pub use error::{MemoryError, Result};
pub use session::{Session, SessionStore};

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

/// Owns the single SQLite connection backing the session store, the
/// conversation log, and the token usage ledger for one `brokerd` instance.
/// All three share the same file so a session delete cascades through
/// messages and usage rows in one transaction-free `ON DELETE CASCADE`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// An in-memory store, useful for tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore { conn: self.conn.clone() }
    }

    pub fn conversation(&self, session_id: impl Into<String>) -> ConversationLog {
        ConversationLog { conn: self.conn.clone(), session_id: session_id.into() }
    }

    /// Gives the token ledger direct access to the shared connection so it
    /// can manage the `token_usage` table without this crate needing to know
    /// about pricing or cost-estimation logic.
    pub fn raw_connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}
