// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loader configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [loader]
//! interval_ms = 3000
//!
//! [source]
//! path = "observations.db"
//!
//! [destination]
//! kind = "kairosdb"
//! url = "http://localhost:8080"
//!
//! [[destination.entities]]
//! name = "observations"
//! tags = ["observationKind"]
//!
//! [[jobs]]
//! table = "observation"
//! entity = "observations"
//! ```

use crate::checkpoint::CheckpointSchema;
use crate::window::DEFAULT_INCREMENT_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tsload_sink::DestinationConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Example configuration written by `tsload gen-config`.
pub const EXAMPLE_CONFIG: &str = r#"# tsload configuration

[loader]
# Delay between cycles.
interval_ms = 3000
# Upper bound for the delay after consecutive empty cycles.
# Defaults to interval_ms, which disables backoff.
# max_idle_interval_ms = 30000
log_level = "info"

[source]
path = "observations.db"

[checkpoint]
# Defaults to the source database.
# path = "tsload-state.db"
table = "processed_rows"
table_name_column = "table_name"
last_id_column = "last_id"
increment_column = "increment_size"
pending_seed_column = "pending_seed"

[destination]
kind = "kairosdb"
url = "http://localhost:8080"
timeout_ms = 30000

[[destination.entities]]
name = "observations"
tags = ["observationKind"]

[[jobs]]
table = "observation"
entity = "observations"
id_column = "id"
increment_size = 1000
identity_columns = ["fieldUnitZoneIdentifier", "fieldUnitAddress", "deviceLabel", "observationKind"]
separator = "."
time_column = "observationTimeEpochSeconds"
value_column = "observedValue"
tag_columns = ["observationKind"]
"#;

/// Loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub loader: LoopConfig,

    pub source: SourceConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    pub destination: DestinationConfig,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Cycle loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Delay between cycles in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Maximum delay after consecutive empty cycles (defaults to `interval_ms`).
    #[serde(default)]
    pub max_idle_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_idle_interval_ms: None,
            log_level: default_log_level(),
        }
    }
}

/// Source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
}

/// Checkpoint table location and names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Database file (defaults to the source database).
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_checkpoint_table")]
    pub table: String,

    #[serde(default = "default_table_name_column")]
    pub table_name_column: String,

    #[serde(default = "default_last_id_column")]
    pub last_id_column: String,

    #[serde(default = "default_increment_column")]
    pub increment_column: String,

    #[serde(default = "default_pending_seed_column")]
    pub pending_seed_column: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: default_checkpoint_table(),
            table_name_column: default_table_name_column(),
            last_id_column: default_last_id_column(),
            increment_column: default_increment_column(),
            pending_seed_column: default_pending_seed_column(),
        }
    }
}

impl CheckpointConfig {
    /// Table and column names.
    pub fn schema(&self) -> CheckpointSchema {
        CheckpointSchema {
            table: self.table.clone(),
            table_name_column: self.table_name_column.clone(),
            last_id_column: self.last_id_column.clone(),
            increment_column: self.increment_column.clone(),
            pending_seed_column: self.pending_seed_column.clone(),
        }
    }
}

/// One source table replicated into one destination entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Source table.
    pub table: String,

    /// Destination entity.
    pub entity: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Window width used when seeding the checkpoint.
    #[serde(default = "default_increment_size")]
    pub increment_size: i64,

    /// Columns joined, in order, into the point name.
    #[serde(default = "default_identity_columns")]
    pub identity_columns: Vec<String>,

    #[serde(default = "default_separator")]
    pub separator: String,

    /// Epoch seconds column.
    #[serde(default = "default_time_column")]
    pub time_column: String,

    #[serde(default = "default_value_column")]
    pub value_column: String,

    /// Columns copied as tags under their own name.
    #[serde(default = "default_tag_columns")]
    pub tag_columns: Vec<String>,
}

impl JobConfig {
    /// Job with default observation column mapping.
    pub fn new(table: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entity: entity.into(),
            id_column: default_id_column(),
            increment_size: default_increment_size(),
            identity_columns: default_identity_columns(),
            separator: default_separator(),
            time_column: default_time_column(),
            value_column: default_value_column(),
            tag_columns: default_tag_columns(),
        }
    }

    /// Set the window width.
    pub fn increment_size(mut self, size: i64) -> Self {
        self.increment_size = size;
        self
    }
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_checkpoint_table() -> String {
    "processed_rows".to_string()
}

fn default_table_name_column() -> String {
    "table_name".to_string()
}

fn default_last_id_column() -> String {
    "last_id".to_string()
}

fn default_increment_column() -> String {
    "increment_size".to_string()
}

fn default_pending_seed_column() -> String {
    "pending_seed".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_increment_size() -> i64 {
    DEFAULT_INCREMENT_SIZE
}

fn default_identity_columns() -> Vec<String> {
    [
        "fieldUnitZoneIdentifier",
        "fieldUnitAddress",
        "deviceLabel",
        "observationKind",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_separator() -> String {
    ".".to_string()
}

fn default_time_column() -> String {
    "observationTimeEpochSeconds".to_string()
}

fn default_value_column() -> String {
    "observedValue".to_string()
}

fn default_tag_columns() -> Vec<String> {
    vec!["observationKind".to_string()]
}

impl LoaderConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a new config builder
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.interval_ms == 0 {
            return Err(ConfigError::Invalid("interval_ms must be positive".into()));
        }
        if let Some(max) = self.loader.max_idle_interval_ms {
            if max < self.loader.interval_ms {
                return Err(ConfigError::Invalid(format!(
                    "max_idle_interval_ms ({}) is below interval_ms ({})",
                    max, self.loader.interval_ms
                )));
            }
        }

        self.destination
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid("No jobs configured".into()));
        }

        for (i, job) in self.jobs.iter().enumerate() {
            if job.table.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("Job {} has empty table", i)));
            }
            if job.increment_size <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "Job {} ({}) has non-positive increment_size {}",
                    i, job.table, job.increment_size
                )));
            }
            if !self.destination.has_entity(&job.entity) {
                return Err(ConfigError::Invalid(format!(
                    "Job {} ({}) targets undeclared entity '{}'",
                    i, job.table, job.entity
                )));
            }
            if job.identity_columns.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Job {} ({}) has no identity columns",
                    i, job.table
                )));
            }
        }

        let mut tables: Vec<&str> = self.jobs.iter().map(|j| j.table.as_str()).collect();
        tables.sort_unstable();
        if let Some(w) = tables.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!(
                "Table '{}' is configured by more than one job",
                w[0]
            )));
        }

        Ok(())
    }

    /// Delay between cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.loader.interval_ms)
    }

    /// Maximum delay after consecutive empty cycles.
    pub fn max_idle_interval(&self) -> Duration {
        Duration::from_millis(
            self.loader
                .max_idle_interval_ms
                .unwrap_or(self.loader.interval_ms),
        )
    }

    /// Checkpoint database path.
    pub fn checkpoint_path(&self) -> &Path {
        self.checkpoint.path.as_deref().unwrap_or(&self.source.path)
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    interval_ms: Option<u64>,
    max_idle_interval_ms: Option<u64>,
    source_path: Option<PathBuf>,
    checkpoint: CheckpointConfig,
    destination: Option<DestinationConfig>,
    jobs: Vec<JobConfig>,
}

impl LoaderConfigBuilder {
    /// Set the delay between cycles
    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = Some(ms);
        self
    }

    /// Set the maximum idle delay
    pub fn max_idle_interval_ms(mut self, ms: u64) -> Self {
        self.max_idle_interval_ms = Some(ms);
        self
    }

    /// Set the source database
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Store checkpoints in a separate database
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint.path = Some(path.into());
        self
    }

    /// Set the destination
    pub fn destination(mut self, destination: DestinationConfig) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Add a job
    pub fn job(mut self, job: JobConfig) -> Self {
        self.jobs.push(job);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<LoaderConfig, ConfigError> {
        let source_path = self
            .source_path
            .ok_or_else(|| ConfigError::Invalid("Missing source path".into()))?;
        let destination = self
            .destination
            .ok_or_else(|| ConfigError::Invalid("Missing destination".into()))?;

        let config = LoaderConfig {
            loader: LoopConfig {
                interval_ms: self.interval_ms.unwrap_or_else(default_interval_ms),
                max_idle_interval_ms: self.max_idle_interval_ms,
                log_level: default_log_level(),
            },
            source: SourceConfig { path: source_path },
            checkpoint: self.checkpoint,
            destination,
            jobs: self.jobs,
        };
        config.validate()?;
        Ok(config)
    }
}
