// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink errors.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by sinks and destinations.
///
/// Per-point rejections reported by a destination are not errors; they are
/// carried in [`crate::PushReport::errors`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination could not be reached or the client could not be built.
    #[error("unable to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: BoxError,
    },

    /// Transport fault while pushing a batch over an established connection.
    #[error("unable to push metrics to {target}: {source}")]
    Push {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The entity was not declared for this sink.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A batch could not be encoded for the wire.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Invalid destination configuration.
    #[error("invalid destination configuration: {0}")]
    Config(String),
}

impl SinkError {
    /// Build a [`SinkError::Connect`].
    pub fn connect(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SinkError::Connect {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Build a [`SinkError::Push`].
    pub fn push(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SinkError::Push {
            target: target.into(),
            source: source.into(),
        }
    }

    /// True for connection-establishment failures.
    pub fn is_connect(&self) -> bool {
        matches!(self, SinkError::Connect { .. })
    }

    /// True for transport failures during a push.
    pub fn is_push(&self) -> bool {
        matches!(self, SinkError::Push { .. })
    }
}
