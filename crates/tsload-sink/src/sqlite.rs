// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite relational destination.
//!
//! Each entity maps to one table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "<entity>" (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name TEXT NOT NULL,
//!     timestamp_ms INTEGER NOT NULL,
//!     value,
//!     tags TEXT NOT NULL
//! );
//! CREATE INDEX IF NOT EXISTS "idx_<entity>_name_ts" ON "<entity>"(name, timestamp_ms);
//! ```
//!
//! A push inserts every point inside one transaction. A rejected insert is
//! reported as a partial error and the remaining points still commit.

use crate::batch::Batch;
use crate::error::SinkError;
use crate::point::FieldValue;
use crate::sink::{Destination, DestinationClient, PushResponse};
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use std::path::PathBuf;

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Float(v) => Value::Real(*v),
        FieldValue::Integer(v) => Value::Integer(*v),
        FieldValue::String(v) => Value::Text(v.clone()),
        FieldValue::Boolean(v) => Value::Integer(i64::from(*v)),
    }
}

/// SQLite database file holding one table per entity.
#[derive(Debug, Clone)]
pub struct SqliteDestination {
    path: PathBuf,
}

impl SqliteDestination {
    /// Create a destination writing to the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Destination for SqliteDestination {
    type Client = SqliteClient;

    fn describe(&self) -> String {
        format!("SQLite ({})", self.path.display())
    }

    fn connect(&self) -> Result<SqliteClient, SinkError> {
        let conn = Connection::open(&self.path).map_err(|e| SinkError::connect(self.describe(), e))?;
        Ok(SqliteClient {
            conn,
            target: self.describe(),
        })
    }
}

/// Open SQLite connection.
pub struct SqliteClient {
    conn: Connection,
    target: String,
}

impl SqliteClient {
    fn ensure_table(&self, entity: &str) -> rusqlite::Result<()> {
        let table = quote_ident(entity);
        let index = quote_ident(&format!("idx_{}_name_ts", entity));
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                value,
                tags TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table}(name, timestamp_ms);"
        ))
    }
}

impl DestinationClient for SqliteClient {
    fn push(&mut self, batch: &Batch) -> Result<PushResponse, SinkError> {
        self.ensure_table(batch.entity())
            .map_err(|e| SinkError::push(self.target.clone(), e))?;

        let insert = format!(
            "INSERT INTO {} (name, timestamp_ms, value, tags) VALUES (?1, ?2, ?3, ?4)",
            quote_ident(batch.entity())
        );

        let target = self.target.clone();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| SinkError::push(target.clone(), e))?;

        let mut errors = Vec::new();
        {
            let mut stmt = tx
                .prepare(&insert)
                .map_err(|e| SinkError::push(target.clone(), e))?;

            for point in batch.points() {
                let tags = serde_json::to_string(&point.tags)
                    .map_err(|e| SinkError::Encode(e.to_string()))?;
                if let Err(e) = stmt.execute(params![
                    point.name,
                    point.timestamp_ms,
                    to_sql_value(&point.value),
                    tags
                ]) {
                    errors.push(format!("{} @ {}: {}", point.name, point.timestamp_ms, e));
                }
            }
        }

        tx.commit().map_err(|e| SinkError::push(target, e))?;
        Ok(PushResponse::with_errors(errors))
    }

    fn shutdown(self) -> Result<(), SinkError> {
        let target = self.target;
        self.conn
            .close()
            .map_err(|(_, e)| SinkError::push(target, e))
    }
}
