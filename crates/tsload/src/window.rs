// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window allocation
//!
//! Turns the per-table watermark into the next bounded id range.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{LoaderError, Result};
use crate::source::ObservationSource;
use std::fmt;

/// Default window width.
pub const DEFAULT_INCREMENT_SIZE: i64 = 1000;

/// An id range processed in one cycle: `from < id < to`.
///
/// A window read from a pending seed (`bootstrap`) also includes `id == from`,
/// since the seed is the smallest id present and has not been considered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub table: String,
    pub from: i64,
    pub to: i64,
    pub bootstrap: bool,
}

impl Window {
    /// True if `id` falls inside the window.
    pub fn contains(&self, id: i64) -> bool {
        let above = if self.bootstrap { id >= self.from } else { id > self.from };
        above && id < self.to
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.bootstrap { '[' } else { '(' };
        write!(f, "{}{}, {})", open, self.from, self.to)
    }
}

/// Computes the next window for a table from its checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct RangeAllocator {
    increment_size: i64,
}

impl Default for RangeAllocator {
    fn default() -> Self {
        Self {
            increment_size: DEFAULT_INCREMENT_SIZE,
        }
    }
}

impl RangeAllocator {
    /// Allocator seeding new checkpoints with `increment_size`.
    pub fn new(increment_size: i64) -> Self {
        Self { increment_size }
    }

    /// Next window for `table`.
    ///
    /// Seeds the checkpoint from the smallest source id when none exists.
    /// The window stays `bootstrap` for as long as the stored seed is pending,
    /// including across restarts. Fails with [`LoaderError::CheckpointInit`]
    /// if the source table is empty.
    pub fn next_window<S, C>(
        &self,
        table: &str,
        id_column: &str,
        source: &S,
        checkpoints: &C,
    ) -> Result<Window>
    where
        S: ObservationSource + ?Sized,
        C: CheckpointStore + ?Sized,
    {
        if let Some(cp) = checkpoints.load(table).map_err(LoaderError::Checkpoint)? {
            return Ok(Window {
                table: table.to_string(),
                from: cp.last_id,
                to: cp.last_id.saturating_add(cp.increment_size),
                bootstrap: cp.pending_seed,
            });
        }

        let min = source
            .min_id(table, id_column)
            .map_err(|source| LoaderError::Extraction {
                table: table.to_string(),
                source,
            })?
            .ok_or_else(|| LoaderError::CheckpointInit {
                table: table.to_string(),
            })?;

        let cp = Checkpoint::seed(table, min, self.increment_size);
        checkpoints.create(&cp).map_err(LoaderError::Checkpoint)?;
        tracing::info!(
            "Initialized checkpoint for {} at id {} (increment {})",
            table,
            min,
            self.increment_size
        );

        Ok(Window {
            table: table.to_string(),
            from: min,
            to: min.saturating_add(self.increment_size),
            bootstrap: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SqliteCheckpointStore;
    use crate::error::StoreError;
    use crate::source::SourceRow;

    struct MinOnly(Option<i64>);

    impl ObservationSource for MinOnly {
        fn min_id(&self, _: &str, _: &str) -> std::result::Result<Option<i64>, StoreError> {
            Ok(self.0)
        }

        fn rows_in_range(
            &self,
            _: &str,
            _: &str,
            _: i64,
            _: i64,
            _: bool,
        ) -> std::result::Result<Vec<SourceRow>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_bootstrap_seeds_from_min_id() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        let window = RangeAllocator::new(1000)
            .next_window("observation", "id", &MinOnly(Some(5000)), &store)
            .unwrap();

        assert_eq!((window.from, window.to), (5000, 6000));
        assert!(window.bootstrap);
        assert_eq!(
            store.load("observation").unwrap(),
            Some(Checkpoint::seed("observation", 5000, 1000))
        );
    }

    #[test]
    fn test_pending_seed_reopens_bootstrap_window() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        store.create(&Checkpoint::seed("observation", 5000, 1000)).unwrap();

        let window = RangeAllocator::new(10)
            .next_window("observation", "id", &MinOnly(Some(4000)), &store)
            .unwrap();

        assert_eq!((window.from, window.to), (5000, 6000));
        assert!(window.bootstrap);
        assert!(window.contains(5000));
    }

    #[test]
    fn test_existing_checkpoint_uses_stored_increment() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        store.create(&Checkpoint::new("observation", 5999, 500)).unwrap();

        let window = RangeAllocator::new(1000)
            .next_window("observation", "id", &MinOnly(Some(1)), &store)
            .unwrap();

        assert_eq!((window.from, window.to), (5999, 6499));
        assert!(!window.bootstrap);
    }

    #[test]
    fn test_empty_source_fails_init() {
        let store = SqliteCheckpointStore::new_in_memory().unwrap();
        let err = RangeAllocator::default()
            .next_window("observation", "id", &MinOnly(None), &store)
            .unwrap_err();

        assert!(matches!(err, LoaderError::CheckpointInit { .. }));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_window_bounds() {
        let mut window = Window {
            table: "t".into(),
            from: 10,
            to: 20,
            bootstrap: false,
        };
        assert!(!window.contains(10));
        assert!(window.contains(11));
        assert!(!window.contains(20));
        assert_eq!(window.to_string(), "(10, 20)");

        window.bootstrap = true;
        assert!(window.contains(10));
        assert_eq!(window.to_string(), "[10, 20)");
    }
}
