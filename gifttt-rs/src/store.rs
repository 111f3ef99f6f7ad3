//! Durable key/value storage.
//!
//! Variables are persisted under `var~<name>` as a JSON record
//! `{"value": …}`.  The [`Backend`] trait is the seam to the storage engine;
//! [`SqliteBackend`] keeps the keys in a single SQLite table,
//! [`MemoryBackend`] keeps them in memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Prefix of every variable key.
pub const KEY_PREFIX: &str = "var~";

/// Storage key of variable `name`.
pub fn var_key(name: &str) -> String {
    format!("{KEY_PREFIX}{name}")
}

/// Persisted layout of one variable (also the body of an API write).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub value: serde_json::Value,
}

/// A durable string → string map.
pub trait Backend: Send + Sync {
    /// `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ── SqliteBackend ─────────────────────────────────────────────────────────────

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS gifttt (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

/// Embedded SQLite database with one key/value table.
#[derive(Debug)]
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`, creating missing parent
    /// directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path, conn: Mutex::new(conn) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM gifttt WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO gifttt (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

// ── MemoryBackend ─────────────────────────────────────────────────────────────

/// In-memory backend; counts writes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data.lock().insert(key.to_owned(), value.to_owned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_prefixed() {
        assert_eq!(var_key("alarm"), "var~alarm");
    }

    #[test]
    fn record_layout() {
        let r = Record { value: json!([1, "a"]) };
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"value":[1,"a"]}"#);
        let back: Record = serde_json::from_str(r#"{"value": 2.5}"#).unwrap();
        assert_eq!(back.value, json!(2.5));
    }

    #[test]
    fn memory_backend_counts_writes() {
        let m = MemoryBackend::new();
        assert_eq!(m.get("k").unwrap(), None);
        m.set("k", "v").unwrap();
        assert_eq!(m.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(m.writes(), 1);
    }

    #[test]
    fn sqlite_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gifttt.db");
        {
            let b = SqliteBackend::open(&path).unwrap();
            b.set("var~x", r#"{"value":1}"#).unwrap();
            b.set("var~y", r#"{"value":"on"}"#).unwrap();
            b.set("var~x", r#"{"value":2}"#).unwrap();
        }
        let b = SqliteBackend::open(&path).unwrap();
        assert_eq!(b.get("var~x").unwrap().as_deref(), Some(r#"{"value":2}"#));
        assert_eq!(b.get("var~y").unwrap().as_deref(), Some(r#"{"value":"on"}"#));
        assert_eq!(b.get("var~z").unwrap(), None);
    }

    #[test]
    fn sqlite_backend_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.db");
        SqliteBackend::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn sqlite_backend_rejects_a_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        fs::write(&path, "this is not a database\n".repeat(64)).unwrap();
        assert!(matches!(SqliteBackend::open(&path), Err(StoreError::Sqlite(_))));
    }
}
