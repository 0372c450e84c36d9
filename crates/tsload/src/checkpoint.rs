// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Checkpoint persistence
//!
//! One record per source table holding the highest row id already
//! considered and the window width used to read past it. A freshly seeded
//! record points at the smallest source id, which has not been considered
//! yet; it stays flagged until the first advance.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tsload_sink::sqlite::quote_ident;

/// Watermark for one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    /// Source table name (identity key).
    pub table: String,
    /// Highest source row id already considered.
    pub last_id: i64,
    /// Window width.
    pub increment_size: i64,
    /// `last_id` is the seed and the row holding it is still unprocessed.
    pub pending_seed: bool,
}

impl Checkpoint {
    /// Create a checkpoint record.
    pub fn new(table: impl Into<String>, last_id: i64, increment_size: i64) -> Self {
        Self {
            table: table.into(),
            last_id,
            increment_size,
            pending_seed: false,
        }
    }

    /// Seed record at the smallest source id, not yet considered.
    pub fn seed(table: impl Into<String>, min_id: i64, increment_size: i64) -> Self {
        Self {
            pending_seed: true,
            ..Self::new(table, min_id, increment_size)
        }
    }
}

/// Durable checkpoint storage.
///
/// The loader is the only writer; no locking beyond the store's own is assumed.
pub trait CheckpointStore {
    /// Load the checkpoint for `table`, if any.
    fn load(&self, table: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Persist a new checkpoint.
    fn create(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Move `last_id` forward to `last_id` and clear the pending seed. A value
    /// below the stored one is ignored. Returns true if a record matched.
    fn advance(&self, table: &str, last_id: i64) -> Result<bool, StoreError>;

    /// All stored checkpoints, ordered by table name.
    fn list(&self) -> Result<Vec<Checkpoint>, StoreError>;
}

/// Names of the checkpoint table and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSchema {
    pub table: String,
    pub table_name_column: String,
    pub last_id_column: String,
    pub increment_column: String,
    pub pending_seed_column: String,
}

impl Default for CheckpointSchema {
    fn default() -> Self {
        Self {
            table: "processed_rows".to_string(),
            table_name_column: "table_name".to_string(),
            last_id_column: "last_id".to_string(),
            increment_column: "increment_size".to_string(),
            pending_seed_column: "pending_seed".to_string(),
        }
    }
}

impl CheckpointSchema {
    fn check(&self) -> Result<(), StoreError> {
        for name in [
            &self.table,
            &self.table_name_column,
            &self.last_id_column,
            &self.increment_column,
            &self.pending_seed_column,
        ] {
            if name.trim().is_empty() {
                return Err(StoreError::Identifier(name.clone()));
            }
        }
        Ok(())
    }
}

/// SQLite checkpoint store
///
/// # Schema
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS processed_rows (
///     table_name TEXT PRIMARY KEY,
///     last_id INTEGER NOT NULL,
///     increment_size INTEGER NOT NULL,
///     pending_seed INTEGER NOT NULL DEFAULT 0
/// );
/// ```
///
/// Table and column names are configurable through [`CheckpointSchema`].
/// Tables created without the pending seed column get it added on open.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    select_one: String,
    select_all: String,
    insert: String,
    update: String,
}

impl SqliteCheckpointStore {
    /// Open (or create) a checkpoint store in the database at `path`.
    pub fn open(path: impl AsRef<Path>, schema: CheckpointSchema) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, schema)
    }

    /// In-memory store with the default schema (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, CheckpointSchema::default())
    }

    fn with_connection(conn: Connection, schema: CheckpointSchema) -> Result<Self, StoreError> {
        schema.check()?;

        let table = quote_ident(&schema.table);
        let name = quote_ident(&schema.table_name_column);
        let last = quote_ident(&schema.last_id_column);
        let inc = quote_ident(&schema.increment_column);
        let pending = quote_ident(&schema.pending_seed_column);

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    {name} TEXT PRIMARY KEY,
                    {last} INTEGER NOT NULL,
                    {inc} INTEGER NOT NULL,
                    {pending} INTEGER NOT NULL DEFAULT 0
                )"
            ),
            [],
        )?;

        let has_pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![schema.table, schema.pending_seed_column],
            |row| row.get(0),
        )?;
        if has_pending == 0 {
            conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {pending} INTEGER NOT NULL DEFAULT 0"),
                [],
            )?;
            tracing::info!("Added {} column to {}", schema.pending_seed_column, schema.table);
        }

        let columns = format!("{name}, {last}, {inc}, {pending}");
        Ok(Self {
            conn: Mutex::new(conn),
            select_one: format!("SELECT {columns} FROM {table} WHERE {name} = ?1"),
            select_all: format!("SELECT {columns} FROM {table} ORDER BY {name}"),
            insert: format!("INSERT INTO {table} ({columns}) VALUES (?1, ?2, ?3, ?4)"),
            update: format!(
                "UPDATE {table} SET {last} = ?2, {pending} = 0 WHERE {name} = ?1 AND {last} <= ?2"
            ),
        })
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
        Ok(Checkpoint {
            table: row.get(0)?,
            last_id: row.get(1)?,
            increment_size: row.get(2)?,
            pending_seed: row.get(3)?,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, table: &str) -> Result<Option<Checkpoint>, StoreError> {
        let conn = self.lock()?;
        let checkpoint = conn
            .query_row(&self.select_one, [table], Self::row_to_checkpoint)
            .optional()?;
        Ok(checkpoint)
    }

    fn create(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &self.insert,
            params![
                checkpoint.table,
                checkpoint.last_id,
                checkpoint.increment_size,
                checkpoint.pending_seed
            ],
        )?;
        Ok(())
    }

    fn advance(&self, table: &str, last_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(&self.update, params![table, last_id])?;
        if changed == 0 {
            tracing::debug!("Checkpoint for {} not moved to {}", table, last_id);
        }
        Ok(changed > 0)
    }

    fn list(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&self.select_all)?;
        let checkpoints = stmt
            .query_map([], Self::row_to_checkpoint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_load() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        assert_eq!(store.load("observation").unwrap(), None);

        store.create(&Checkpoint::new("observation", 5000, 1000)).unwrap();
        assert_eq!(
            store.load("observation").unwrap(),
            Some(Checkpoint::new("observation", 5000, 1000))
        );
    }

    #[test]
    fn test_advance_is_monotone() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        store.create(&Checkpoint::new("observation", 100, 10)).unwrap();

        assert!(store.advance("observation", 150).unwrap());
        assert!(!store.advance("observation", 120).unwrap());
        assert_eq!(store.load("observation").unwrap().unwrap().last_id, 150);

        assert!(store.advance("observation", 150).unwrap());
        assert_eq!(store.load("observation").unwrap().unwrap().last_id, 150);
    }

    #[test]
    fn test_pending_seed_survives_reopen_until_advance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteCheckpointStore::open(&path, CheckpointSchema::default()).unwrap();
            store.create(&Checkpoint::seed("observation", 5000, 1000)).unwrap();
        }

        let store = SqliteCheckpointStore::open(&path, CheckpointSchema::default()).unwrap();
        let cp = store.load("observation").unwrap().unwrap();
        assert!(cp.pending_seed);
        assert_eq!(cp.last_id, 5000);

        assert!(store.advance("observation", 5000).unwrap());
        assert_eq!(
            store.load("observation").unwrap(),
            Some(Checkpoint::new("observation", 5000, 1000))
        );
    }

    #[test]
    fn test_table_without_pending_column_is_upgraded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE processed_rows (
                    table_name TEXT PRIMARY KEY,
                    last_id INTEGER NOT NULL,
                    increment_size INTEGER NOT NULL
                );
                INSERT INTO processed_rows VALUES ('observation', 42, 100);",
            )
            .unwrap();

        let store = SqliteCheckpointStore::open(&path, CheckpointSchema::default()).unwrap();
        assert_eq!(
            store.load("observation").unwrap(),
            Some(Checkpoint::new("observation", 42, 100))
        );
        assert!(store.advance("observation", 50).unwrap());
    }

    #[test]
    fn test_advance_unknown_table() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        assert!(!store.advance("missing", 1).unwrap());
    }

    #[test]
    fn test_list_sorted() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        store.create(&Checkpoint::new("b", 2, 10)).unwrap();
        store.create(&Checkpoint::new("a", 1, 10)).unwrap();

        let tables: Vec<_> = store.list().unwrap().into_iter().map(|c| c.table).collect();
        assert_eq!(tables, vec!["a", "b"]);
    }

    #[test]
    fn test_custom_schema_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let schema = CheckpointSchema {
            table: "loader state".to_string(),
            table_name_column: "source".to_string(),
            last_id_column: "watermark".to_string(),
            increment_column: "step".to_string(),
            pending_seed_column: "unseen".to_string(),
        };

        {
            let store = SqliteCheckpointStore::open(&path, schema.clone()).unwrap();
            store.create(&Checkpoint::new("observation", 7, 3)).unwrap();
            store.advance("observation", 9).unwrap();
        }

        let store = SqliteCheckpointStore::open(&path, schema).unwrap();
        assert_eq!(
            store.load("observation").unwrap(),
            Some(Checkpoint::new("observation", 9, 3))
        );

        let conn = Connection::open(&path).unwrap();
        let watermark: i64 = conn
            .query_row("SELECT watermark FROM \"loader state\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(watermark, 9);
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let schema = CheckpointSchema {
            last_id_column: " ".to_string(),
            ..Default::default()
        };
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            SqliteCheckpointStore::with_connection(conn, schema),
            Err(StoreError::Identifier(_))
        ));
    }
}
