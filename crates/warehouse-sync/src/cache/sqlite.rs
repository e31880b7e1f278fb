use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::storage::KeyValueStorage;
use crate::error::CacheError;

/// SQLite-backed key-value storage.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn =
            Connection::open(path).map_err(|e| CacheError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| CacheError::Storage(format!("init_schema: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock().map_err(|e| CacheError::Storage(e.to_string()))?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| CacheError::Storage(format!("get: {}", e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|e| CacheError::Storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO kv (key, value, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated = excluded.updated",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )
        .map_err(|e| CacheError::Storage(format!("set: {}", e)))?;
        Ok(())
    }
}
