// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Row transformation with watermark tracking.

use crate::mapping::RowMapping;
use crate::source::SourceRow;
use tsload_sink::Point;

/// Result of transforming one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The row produced a point.
    Kept(Point),
    /// The row had no value. It still counts toward the watermark.
    Discarded { id: i64 },
}

/// Applies a [`RowMapping`] to the rows of one window.
pub struct RowTransformer<'a> {
    mapping: &'a RowMapping,
    highest_id: Option<i64>,
    kept: usize,
    discarded: usize,
}

impl<'a> RowTransformer<'a> {
    pub fn new(mapping: &'a RowMapping) -> Self {
        Self {
            mapping,
            highest_id: None,
            kept: 0,
            discarded: 0,
        }
    }

    /// Transform `row`, recording its id whatever the outcome.
    pub fn transform(&mut self, row: &SourceRow) -> Outcome {
        self.highest_id = Some(self.highest_id.map_or(row.id, |h| h.max(row.id)));

        let Some(value) = self.mapping.value(row) else {
            tracing::warn!(
                "Discarding row ID {} with null {}",
                row.id,
                self.mapping.value_field()
            );
            self.discarded += 1;
            return Outcome::Discarded { id: row.id };
        };

        let point = self
            .mapping
            .tags(row)
            .fold(
                Point::new(self.mapping.name(row), self.mapping.timestamp(row), value),
                |p, (name, v)| p.with_tag(name, v),
            );

        self.kept += 1;
        Outcome::Kept(point)
    }

    /// Highest row id seen so far, kept or discarded.
    pub fn highest_id(&self) -> Option<i64> {
        self.highest_id
    }

    pub fn kept(&self) -> usize {
        self.kept
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Rows transformed so far.
    pub fn seen(&self) -> usize {
        self.kept + self.discarded
    }
}
