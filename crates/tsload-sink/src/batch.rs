// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-entity point batch.
//!
//! A batch lives for one cycle: points are appended in extraction order
//! and the whole batch is handed to the destination in a single push.

use crate::point::Point;
use std::collections::BTreeMap;

/// Ordered collection of points for one destination entity.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    entity: String,
    points: Vec<Point>,
}

impl Batch {
    /// Create an empty batch for `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            points: Vec::new(),
        }
    }

    /// Entity this batch targets.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Append a point.
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Move every point of `other` to the end of this batch.
    pub fn append(&mut self, other: Batch) {
        self.points.extend(other.points);
    }

    /// Points in insertion order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Get the current number of buffered points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Group points sharing the same name and tag set, preserving the
    /// order in which each series first appears.
    pub fn series(&self) -> Vec<Series<'_>> {
        let mut index: BTreeMap<(&str, &BTreeMap<String, String>), usize> = BTreeMap::new();
        let mut out: Vec<Series<'_>> = Vec::new();

        for point in &self.points {
            let key = (point.name.as_str(), &point.tags);
            match index.get(&key) {
                Some(&slot) => out[slot].points.push(point),
                None => {
                    index.insert(key, out.len());
                    out.push(Series {
                        name: &point.name,
                        tags: &point.tags,
                        points: vec![point],
                    });
                }
            }
        }

        out
    }
}

/// Points of a single series (same name and tags).
#[derive(Debug)]
pub struct Series<'a> {
    /// Metric name.
    pub name: &'a str,
    /// Tag set shared by every point.
    pub tags: &'a BTreeMap<String, String>,
    /// Points in batch order.
    pub points: Vec<&'a Point>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_insertion_order() {
        let mut batch = Batch::new("observations");
        assert!(batch.is_empty());

        batch.push(Point::new("a", 1, 1.0));
        batch.push(Point::new("b", 2, 2.0));
        batch.push(Point::new("a", 3, 3.0));

        assert_eq!(batch.entity(), "observations");
        assert_eq!(batch.len(), 3);
        let names: Vec<_> = batch.points().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_series_groups_by_name_and_tags() {
        let mut batch = Batch::new("observations");
        batch.push(Point::new("a", 1, 1.0).with_tag("k", "x"));
        batch.push(Point::new("b", 2, 2.0));
        batch.push(Point::new("a", 3, 3.0).with_tag("k", "x"));
        batch.push(Point::new("a", 4, 4.0).with_tag("k", "y"));

        let series = batch.series();
        assert_eq!(series.len(), 3);

        assert_eq!(series[0].name, "a");
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[0].points[1].timestamp_ms, 3);

        assert_eq!(series[1].name, "b");
        assert_eq!(series[2].tags.get("k").map(String::as_str), Some("y"));
    }
}
