pub mod conversations;
pub mod messages;
pub mod migrations;
pub mod rows;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use parley_types::error::ChatError;

/// Durable store handle. A single WAL-mode connection behind a mutex:
/// every mutation runs as one statement or one transaction while the
/// lock is held, so readers never observe a half-applied aggregate.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Connection) -> Result<T, ChatError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::internal(format!("db lock poisoned: {e}")))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ChatError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::internal(format!("db lock poisoned: {e}")))?;
        f(&mut conn)
    }
}

/// Maps rusqlite failures into the opaque internal error arm.
pub(crate) trait SqlExt<T> {
    fn sql(self) -> Result<T, ChatError>;
}

impl<T> SqlExt<T> for Result<T, rusqlite::Error> {
    fn sql(self) -> Result<T, ChatError> {
        self.map_err(ChatError::internal)
    }
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

/// Timestamps are written as RFC 3339, but schema defaults produce
/// SQLite's "YYYY-MM-DD HH:MM:SS"; accept both.
pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
