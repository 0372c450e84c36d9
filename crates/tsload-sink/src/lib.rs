// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tsload metric sinks
//!
//! Turns transformed points into batched destination writes.
//!
//! This crate provides:
//! - A [`MetricSink`] interface with `open` / `write` / `close` semantics
//! - A connection-scoped transaction around every push (connect, push, always release)
//! - Partial-failure reporting: per-point rejections are logged, not raised
//! - Destinations: KairosDB (JSON), InfluxDB v2 (Line Protocol), SQLite (relational)
//!
//! # Overview
//!
//! ```text
//! Point --> WriteHandle (declared tags only) --> Batch --> Destination::connect
//!                                                           --> push --> shutdown
//! ```
//!
//! New destination kinds are added by implementing [`Destination`] and
//! [`DestinationClient`]; [`TimeSeriesSink`] supplies the adapter logic.

pub mod batch;
pub mod config;
pub mod error;
pub mod influx;
pub mod kairos;
pub mod point;
pub mod sink;
pub mod sqlite;

pub use batch::Batch;
pub use config::{DestinationConfig, DestinationKind, EntityConfig};
pub use error::SinkError;
pub use influx::InfluxDestination;
pub use kairos::KairosDestination;
pub use point::{FieldValue, Point};
pub use sink::{
    Destination, DestinationClient, EntityDef, MetricSink, PushReport, PushResponse, SinkStats,
    TimeSeriesSink, WriteHandle,
};
pub use sqlite::SqliteDestination;
