// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loader errors.

use crate::config::ConfigError;
use thiserror::Error;
use tsload_sink::SinkError;

/// Source or checkpoint database fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("invalid identifier: {0:?}")]
    Identifier(String),
}

/// Cycle-level error. Every variant terminates the scheduling loop.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The source table is empty so no checkpoint can be seeded.
    #[error("cannot initialize checkpoint for table '{table}': source table is empty")]
    CheckpointInit { table: String },

    /// Source query or connectivity fault.
    #[error("extraction from '{table}' failed: {source}")]
    Extraction {
        table: String,
        #[source]
        source: StoreError,
    },

    /// Checkpoint read or write fault.
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[source] StoreError),

    /// The destination could not be reached.
    #[error("sink connection failed: {0}")]
    SinkConnect(#[source] SinkError),

    /// Transport fault during a push.
    #[error("sink push failed: {0}")]
    SinkPush(#[source] SinkError),

    /// Any other sink fault (unknown entity, encoding).
    #[error("sink error: {0}")]
    Sink(#[source] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<SinkError> for LoaderError {
    fn from(e: SinkError) -> Self {
        if e.is_connect() {
            LoaderError::SinkConnect(e)
        } else if e.is_push() {
            LoaderError::SinkPush(e)
        } else {
            LoaderError::Sink(e)
        }
    }
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;
