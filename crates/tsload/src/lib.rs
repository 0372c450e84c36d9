// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tsload
//!
//! Incrementally replicates an append-only relational observations table
//! into a time-series store.
//!
//! # Features
//!
//! - **Checkpointed windows** -- one durable watermark per source table
//! - **Typed row mapping** -- name, timestamp, value and tags as functions of the row
//! - **Best-effort points, fatal transport** -- partial push errors are logged, connection faults stop the loop
//! - **Destinations** -- KairosDB, InfluxDB v2 and SQLite via `tsload-sink`
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//! +-- Loader (one cycle over every job)
//!     +-- RangeAllocator   (checkpoint -> window, per job)
//!     +-- RowExtractor     (window -> source rows, per job)
//!     +-- RowTransformer   (row -> point or discard, highest id seen)
//!     +-- MetricSink       (one connection, one push per entity)
//!     +-- CheckpointStore  (advance each job to its highest id seen)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tsload::{Loader, LoaderConfig, Scheduler};
//!
//! let config = LoaderConfig::from_file("tsload.toml")?;
//! let loader = Loader::from_config(&config)?;
//! let mut scheduler = Scheduler::new(loader, config.interval())
//!     .with_max_idle_interval(config.max_idle_interval());
//! scheduler.run()?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod cycle;
pub mod error;
pub mod mapping;
pub mod scheduler;
pub mod source;
pub mod transform;
pub mod window;

pub use checkpoint::{Checkpoint, CheckpointSchema, CheckpointStore, SqliteCheckpointStore};
pub use config::{ConfigError, JobConfig, LoaderConfig};
pub use cycle::{CycleReport, Job, Loader};
pub use error::{LoaderError, StoreError};
pub use mapping::RowMapping;
pub use scheduler::{Scheduler, SchedulerStats, ShutdownHandle};
pub use source::{Cell, ObservationSource, RowExtractor, SourceRow, SqliteSource};
pub use transform::{Outcome, RowTransformer};
pub use window::{RangeAllocator, Window};
