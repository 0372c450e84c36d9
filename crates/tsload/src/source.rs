// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observation source
//!
//! Reads bounded id ranges from an append-only relational table.

use crate::error::{LoaderError, StoreError};
use crate::window::Window;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tsload_sink::sqlite::quote_ident;

/// A typed source column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    /// True for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Textual rendering: decimal text for numbers, lossy UTF-8 for blobs,
    /// `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Integer(v) => Some(v.to_string()),
            Cell::Real(v) => Some(v.to_string()),
            Cell::Text(v) => Some(v.clone()),
            Cell::Blob(v) => Some(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(v) => Cell::Integer(v),
            ValueRef::Real(v) => Cell::Real(v),
            ValueRef::Text(v) => Cell::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Cell::Blob(v.to_vec()),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Integer(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Real(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

/// One raw source record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Primary key.
    pub id: i64,
    cells: BTreeMap<String, Cell>,
}

static NULL: Cell = Cell::Null;

impl SourceRow {
    /// Row with no columns besides its id.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            cells: BTreeMap::new(),
        }
    }

    /// Set a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    /// Column value; a missing column reads as NULL.
    pub fn get(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&NULL)
    }

    /// Column names present in the row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

/// Relational source of observation rows.
pub trait ObservationSource {
    /// Smallest id in `table`, or `None` if the table is empty.
    fn min_id(&self, table: &str, id_column: &str) -> Result<Option<i64>, StoreError>;

    /// Rows with `from < id < to` ordered by ascending id. With
    /// `include_from`, the lower bound is inclusive.
    fn rows_in_range(
        &self,
        table: &str,
        id_column: &str,
        from: i64,
        to: i64,
        include_from: bool,
    ) -> Result<Vec<SourceRow>, StoreError>;
}

/// SQLite observation source.
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open the source database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ObservationSource for SqliteSource {
    fn min_id(&self, table: &str, id_column: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT MIN({}) FROM {}", quote_ident(id_column), quote_ident(table));
        let min = conn
            .query_row(&sql, [], |r| r.get::<_, Option<i64>>(0))
            .optional()?
            .flatten();
        Ok(min)
    }

    fn rows_in_range(
        &self,
        table: &str,
        id_column: &str,
        from: i64,
        to: i64,
        include_from: bool,
    ) -> Result<Vec<SourceRow>, StoreError> {
        let conn = self.lock()?;
        let id = quote_ident(id_column);
        let lower = if include_from { ">=" } else { ">" };
        let sql = format!(
            "SELECT * FROM {} WHERE {id} {lower} ?1 AND {id} < ?2 ORDER BY {id}",
            quote_ident(table)
        );

        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let id_index = names
            .iter()
            .position(|n| n == id_column)
            .ok_or_else(|| StoreError::Identifier(id_column.to_string()))?;

        let rows = stmt
            .query_map(params![from, to], |row| {
                let mut cells = BTreeMap::new();
                for (i, name) in names.iter().enumerate() {
                    cells.insert(name.clone(), Cell::from(row.get_ref(i)?));
                }
                Ok(SourceRow {
                    id: row.get(id_index)?,
                    cells,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

/// Fetches the rows of one window from a source table.
pub struct RowExtractor<'a, S: ObservationSource + ?Sized> {
    source: &'a S,
    table: &'a str,
    id_column: &'a str,
}

impl<'a, S: ObservationSource + ?Sized> RowExtractor<'a, S> {
    pub fn new(source: &'a S, table: &'a str, id_column: &'a str) -> Self {
        Self {
            source,
            table,
            id_column,
        }
    }

    /// Rows inside `window`, ascending by id. An empty window is not an error.
    pub fn fetch(&self, window: &Window) -> Result<Vec<SourceRow>, LoaderError> {
        self.source
            .rows_in_range(self.table, self.id_column, window.from, window.to, window.bootstrap)
            .map_err(|source| LoaderError::Extraction {
                table: self.table.to_string(),
                source,
            })
    }
}
