use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{split_path, validate_path, ChildSnapshot, RemoteStore};

/// Local SQLite stand-in for the remote store. One row per leaf path.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS nodes (
              path TEXT PRIMARY KEY,
              parent TEXT NOT NULL,
              key TEXT NOT NULL,
              value_json TEXT NOT NULL,
              written_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent, key);
            "#,
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl RemoteStore for SqliteStore {
    fn write(&mut self, path: &str, value: &Value) -> Result<()> {
        let (parent, key) = split_path(path)?;
        let value_json = serde_json::to_string(value)?;
        let written_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO nodes(path, parent, key, value_json, written_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![path, parent, key, value_json, written_at],
        )?;
        Ok(())
    }

    fn read_children(&mut self, path: &str) -> Result<Vec<ChildSnapshot>> {
        validate_path(path)?;
        let mut stmt = self
            .conn
            .prepare("SELECT key, value_json FROM nodes WHERE parent = ?1 ORDER BY key")?;
        let mut rows = stmt.query(params![path])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let raw: String = row.get(1)?;
            let value = serde_json::from_str(&raw)
                .map_err(|e| anyhow!("corrupt node {}/{}: {}", path, key, e))?;
            out.push(ChildSnapshot { key, value });
        }
        Ok(out)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        validate_path(path)?;
        // Prefix match without LIKE: keys may contain '_'.
        self.conn.execute(
            r#"
            DELETE FROM nodes
            WHERE path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'
            "#,
            params![path],
        )?;
        Ok(())
    }
}
