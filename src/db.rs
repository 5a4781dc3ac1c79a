// src/db.rs

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::state::lock;
use crate::storage::KeyValueStore;

pub fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

pub fn open_db(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_millis(2000))?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            namespace   TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY (namespace, key)
        );
        "#,
    )?;
    Ok(())
}

/// Data directory: an explicit override, or `<data dir>/parley`.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> Result<PathBuf, StoreError> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_dir().ok_or(StoreError::NoDataDir)?.join("parley"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("parley.sqlite3")
}

/// SQLite-backed key-value store. One connection per process.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_db(path)?;
        init_db(&conn)?;
        tracing::debug!("[db] opened {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let conn = lock(&self.conn);
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO kv (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![namespace, key, value, unix_ms()],
        )?;
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(())
    }

    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            r#"
            SELECT key, value
            FROM kv
            WHERE namespace = ?1
            ORDER BY key ASC
            "#,
        )?;

        let rows = stmt.query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn clear(&self, namespace: &str) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        conn.execute("DELETE FROM kv WHERE namespace = ?1", params![namespace])?;
        Ok(())
    }
}
