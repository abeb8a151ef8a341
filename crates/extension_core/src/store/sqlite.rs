//! SQLite-backed durable store.
//!
//! # Invariants
//! - One row per document key; `put` replaces the whole row.
//! - Values are stored as JSON text and must decode on read.

use super::{StateStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    /// Opens a migrated in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM memory WHERE key = ?1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO memory (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStateStore;
    use crate::store::StateStore;
    use serde_json::json;

    #[test]
    fn put_replaces_whole_document() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .put("extensions.active", json!({ "a/b": {}, "c/d": {} }))
            .unwrap();
        store.put("extensions.active", json!({ "c/d": {} })).unwrap();

        assert_eq!(
            store.get("extensions.active").unwrap(),
            Some(json!({ "c/d": {} }))
        );
        assert_eq!(store.get("extensions.available").unwrap(), None);
    }

    #[test]
    fn preserves_document_key_order() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .put("extensions.active", json!({ "zeta/first": {}, "alpha/second": {} }))
            .unwrap();

        let value = store.get("extensions.active").unwrap().unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta/first".to_string(), "alpha/second".to_string()]);
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO memory (key, value) VALUES ('extensions.active', '{broken');",
                [],
            )
            .unwrap();
        assert!(store.get("extensions.active").is_err());
    }
}
