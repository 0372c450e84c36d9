// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination configuration.

use crate::error::SinkError;
use crate::influx::InfluxDestination;
use crate::kairos::KairosDestination;
use crate::sink::{EntityDef, MetricSink, TimeSeriesSink};
use crate::sqlite::SqliteDestination;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Supported destination kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// KairosDB REST API.
    Kairosdb,
    /// InfluxDB v2 write API.
    Influxdb,
    /// Local SQLite database.
    Sqlite,
}

/// Entity declaration in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name.
    pub name: String,
    /// Tag names accepted by the entity.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination kind.
    pub kind: DestinationKind,

    /// Name used in logs (defaults to the kind).
    #[serde(default)]
    pub name: Option<String>,

    /// Endpoint URL (KairosDB, InfluxDB).
    #[serde(default)]
    pub url: Option<String>,

    /// InfluxDB organization.
    #[serde(default)]
    pub org: Option<String>,

    /// InfluxDB bucket.
    #[serde(default)]
    pub bucket: Option<String>,

    /// InfluxDB authentication token.
    #[serde(default)]
    pub token: Option<String>,

    /// Database file (SQLite).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Entities accepted by the destination.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn require<'a>(value: &'a Option<String>, what: &str, kind: &str) -> Result<&'a str, SinkError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SinkError::Config(format!("{} destination requires '{}'", kind, what))),
    }
}

impl DestinationConfig {
    /// KairosDB destination at `url`.
    pub fn kairosdb(url: impl Into<String>) -> Self {
        Self::with_kind(DestinationKind::Kairosdb).url(url)
    }

    /// SQLite destination at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::with_kind(DestinationKind::Sqlite);
        config.path = Some(path.into());
        config
    }

    fn with_kind(kind: DestinationKind) -> Self {
        Self {
            kind,
            name: None,
            url: None,
            org: None,
            bucket: None,
            token: None,
            path: None,
            timeout_ms: default_timeout_ms(),
            entities: Vec::new(),
        }
    }

    /// Set the URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Declare an entity with its tag names.
    pub fn add_entity<I, S>(mut self, name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities.push(EntityConfig {
            name: name.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Check that the fields required by `kind` are present.
    pub fn validate(&self) -> Result<(), SinkError> {
        match self.kind {
            DestinationKind::Kairosdb => {
                require(&self.url, "url", "kairosdb")?;
            }
            DestinationKind::Influxdb => {
                require(&self.url, "url", "influxdb")?;
                require(&self.org, "org", "influxdb")?;
                require(&self.bucket, "bucket", "influxdb")?;
                require(&self.token, "token", "influxdb")?;
            }
            DestinationKind::Sqlite => {
                if self.path.is_none() {
                    return Err(SinkError::Config("sqlite destination requires 'path'".into()));
                }
            }
        }

        if self.entities.is_empty() {
            return Err(SinkError::Config("no entities declared".into()));
        }
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(SinkError::Config("entity name cannot be blank".into()));
            }
        }

        Ok(())
    }

    /// True if `name` is a declared entity.
    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.iter().any(|e| e.name == name)
    }

    fn entity_defs(&self) -> Vec<EntityDef> {
        self.entities
            .iter()
            .map(|e| EntityDef::new(e.name.clone(), e.tags.iter().cloned()))
            .collect()
    }

    /// Build the configured sink.
    pub fn build_sink(&self) -> Result<Box<dyn MetricSink>, SinkError> {
        self.validate()?;
        let timeout = Duration::from_millis(self.timeout_ms);
        let entities = self.entity_defs();

        let sink: Box<dyn MetricSink> = match self.kind {
            DestinationKind::Kairosdb => {
                let name = self.name.clone().unwrap_or_else(|| "kairos".to_string());
                let dest = KairosDestination::new(name, require(&self.url, "url", "kairosdb")?, timeout)?;
                Box::new(TimeSeriesSink::new(dest, entities))
            }
            DestinationKind::Influxdb => {
                let dest = InfluxDestination::new(
                    require(&self.url, "url", "influxdb")?,
                    require(&self.org, "org", "influxdb")?,
                    require(&self.bucket, "bucket", "influxdb")?,
                    require(&self.token, "token", "influxdb")?,
                    timeout,
                )?;
                Box::new(TimeSeriesSink::new(dest, entities))
            }
            DestinationKind::Sqlite => {
                let path = self
                    .path
                    .clone()
                    .ok_or_else(|| SinkError::Config("sqlite destination requires 'path'".into()))?;
                Box::new(TimeSeriesSink::new(SqliteDestination::new(path), entities))
            }
        };

        Ok(sink)
    }
}
