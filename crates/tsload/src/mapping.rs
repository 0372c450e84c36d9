// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Row to point mapping
//!
//! Each destination field is produced by a function of the source row,
//! resolved once at configuration time.
//!
//! | Destination | Default function                                                       |
//! |-------------|------------------------------------------------------------------------|
//! | name        | `join_columns([zone, address, device, kind], ".")`                     |
//! | timestamp   | `seconds_to_millis("observationTimeEpochSeconds")`, now when NULL      |
//! | value       | `copy_value("observedValue")`, discard when NULL                       |
//! | tags        | `copy_tag("observationKind")`                                          |

use crate::config::JobConfig;
use crate::source::{Cell, SourceRow};
use std::time::{SystemTime, UNIX_EPOCH};
use tsload_sink::FieldValue;

/// Produces the point name.
pub type IdentityFn = Box<dyn Fn(&SourceRow) -> String + Send + Sync>;

/// Produces the timestamp in epoch milliseconds.
pub type TimestampFn = Box<dyn Fn(&SourceRow) -> i64 + Send + Sync>;

/// Produces the value, or `None` to discard the row.
pub type ValueFn = Box<dyn Fn(&SourceRow) -> Option<FieldValue> + Send + Sync>;

/// Produces a tag value, or `None` to omit the tag.
pub type TagFn = Box<dyn Fn(&SourceRow) -> Option<String> + Send + Sync>;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Join `columns` in order with `separator`. A NULL column is an empty segment.
pub fn join_columns<I, S>(columns: I, separator: impl Into<String>) -> IdentityFn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    let separator = separator.into();
    Box::new(move |row| {
        columns
            .iter()
            .map(|c| row.get(c).as_text().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(&separator)
    })
}

/// Epoch seconds in `column` to milliseconds. NULL or unparseable means now.
pub fn seconds_to_millis(column: impl Into<String>) -> TimestampFn {
    let column = column.into();
    Box::new(move |row| {
        let millis = match row.get(&column) {
            Cell::Integer(s) => Some(s.saturating_mul(1000)),
            Cell::Real(s) => Some((s * 1000.0) as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok().map(|s| s.saturating_mul(1000)),
            Cell::Null | Cell::Blob(_) => None,
        };
        millis.unwrap_or_else(now_millis)
    })
}

/// Copy `column` as the value. NULL or blob discards the row.
pub fn copy_value(column: impl Into<String>) -> ValueFn {
    let column = column.into();
    Box::new(move |row| match row.get(&column) {
        Cell::Integer(v) => Some(FieldValue::Integer(*v)),
        Cell::Real(v) => Some(FieldValue::Float(*v)),
        Cell::Text(v) => Some(FieldValue::String(v.clone())),
        Cell::Null | Cell::Blob(_) => None,
    })
}

/// Copy `column` as a tag value. NULL omits the tag.
pub fn copy_tag(column: impl Into<String>) -> TagFn {
    let column = column.into();
    Box::new(move |row| row.get(&column).as_text())
}

/// Mapping from a source row to a destination point.
pub struct RowMapping {
    identity: IdentityFn,
    timestamp: TimestampFn,
    value: ValueFn,
    value_field: String,
    tags: Vec<(String, TagFn)>,
}

impl RowMapping {
    /// Create a mapping. `value_field` names the value source in discard logs.
    pub fn new(
        identity: IdentityFn,
        timestamp: TimestampFn,
        value: ValueFn,
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            timestamp,
            value,
            value_field: value_field.into(),
            tags: Vec::new(),
        }
    }

    /// Add a tag produced by `f`.
    pub fn with_tag(mut self, name: impl Into<String>, f: TagFn) -> Self {
        self.tags.push((name.into(), f));
        self
    }

    /// Mapping described by a job configuration.
    pub fn from_job(job: &JobConfig) -> Self {
        let mapping = Self::new(
            join_columns(job.identity_columns.iter().cloned(), job.separator.clone()),
            seconds_to_millis(job.time_column.clone()),
            copy_value(job.value_column.clone()),
            job.value_column.clone(),
        );
        job.tag_columns
            .iter()
            .fold(mapping, |m, tag| m.with_tag(tag.clone(), copy_tag(tag.clone())))
    }

    pub fn name(&self, row: &SourceRow) -> String {
        (self.identity)(row)
    }

    pub fn timestamp(&self, row: &SourceRow) -> i64 {
        (self.timestamp)(row)
    }

    pub fn value(&self, row: &SourceRow) -> Option<FieldValue> {
        (self.value)(row)
    }

    /// Tags present in `row`, keyed by destination tag name.
    pub fn tags<'a>(&'a self, row: &'a SourceRow) -> impl Iterator<Item = (&'a str, String)> + 'a {
        self.tags
            .iter()
            .filter_map(move |(name, f)| f(row).map(|v| (name.as_str(), v)))
    }

    /// Source field feeding the value.
    pub fn value_field(&self) -> &str {
        &self.value_field
    }
}
