//! SQLite-backed event store
//!
//! Uses a single WAL-mode connection behind a mutex and embedded
//! migrations managed via PRAGMA user_version.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::payload::Payload;

use super::{EventStore, QueuedEvent};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: the event queue
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        payload    TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    "#,
];

/// Durable queue backed by SQLite
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open or create a queue database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode so the drain loop's reads never block writers
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory queue (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run all pending migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current_version: i32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap_or(0);

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::debug!(version, "running queue migration");
                conn.execute_batch(migration)?;
                conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
            }
        }

        if current_version < SCHEMA_VERSION {
            tracing::debug!(from = current_version, to = SCHEMA_VERSION, "queue migrations complete");
        }

        Ok(())
    }
}

impl EventStore for SqliteEventStore {
    fn add(&self, payload: &Payload) -> Result<i64> {
        let serialized = serde_json::to_string(payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (payload) VALUES (?1)",
            params![serialized],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn next_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, payload FROM events ORDER BY id ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut batch = Vec::new();
        for row in rows {
            let (id, serialized) = row?;
            let payload: Payload = serde_json::from_str(&serialized)?;
            batch.push(QueuedEvent { id, payload });
        }
        Ok(batch)
    }

    fn remove(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM events WHERE id IN ({})", placeholders);
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
        Ok(removed)
    }

    fn size(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
