// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! KairosDB destination.
//!
//! Pushes batches to the REST endpoint `POST /api/v1/datapoints`:
//!
//! ```json
//! [
//!   {
//!     "name": "Z1.A1.D1.temp",
//!     "tags": { "observationKind": "temp" },
//!     "datapoints": [[1700000000000, 21.5], [1700000003000, 21.7]]
//!   }
//! ]
//! ```
//!
//! A rejected push answers with `{"errors": [...]}`; those messages are
//! surfaced as partial errors instead of failing the push.

use crate::batch::Batch;
use crate::error::SinkError;
use crate::point::FieldValue;
use crate::sink::{Destination, DestinationClient, PushResponse};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct KairosMetric<'a> {
    name: &'a str,
    tags: &'a BTreeMap<String, String>,
    datapoints: Vec<(i64, &'a FieldValue)>,
}

#[derive(Debug, Default, Deserialize)]
struct KairosErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Encode a batch as the KairosDB datapoints JSON body.
pub fn encode_batch(batch: &Batch) -> Result<String, SinkError> {
    let metrics: Vec<KairosMetric<'_>> = batch
        .series()
        .into_iter()
        .map(|s| KairosMetric {
            name: s.name,
            tags: s.tags,
            datapoints: s.points.iter().map(|p| (p.timestamp_ms, &p.value)).collect(),
        })
        .collect();

    serde_json::to_string(&metrics).map_err(|e| SinkError::Encode(e.to_string()))
}

/// KairosDB connection settings.
#[derive(Debug, Clone)]
pub struct KairosDestination {
    name: String,
    url: String,
    timeout: Duration,
}

impl KairosDestination {
    /// Create a destination named `name` at `url`. The URL must not be blank.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SinkError::Config("KairosDB connection URL cannot be blank".into()));
        }
        Ok(Self {
            name: name.into(),
            url: url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Base URL without trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Destination for KairosDestination {
    type Client = KairosClient;

    fn describe(&self) -> String {
        format!("KairosDB ({} - {})", self.name, self.url)
    }

    fn connect(&self) -> Result<KairosClient, SinkError> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SinkError::connect(self.describe(), e))?;

        let health = format!("{}/api/v1/health/check", self.url);
        http.get(&health)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SinkError::connect(self.describe(), e))?;

        Ok(KairosClient {
            http,
            push_url: format!("{}/api/v1/datapoints", self.url),
            target: self.describe(),
        })
    }
}

/// Connected KairosDB client.
pub struct KairosClient {
    http: Client,
    push_url: String,
    target: String,
}

impl DestinationClient for KairosClient {
    fn push(&mut self, batch: &Batch) -> Result<PushResponse, SinkError> {
        let body = encode_batch(batch)?;

        let response = self
            .http
            .post(&self.push_url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|e| SinkError::push(self.target.clone(), e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(PushResponse::ok());
        }

        let text = response
            .text()
            .map_err(|e| SinkError::push(self.target.clone(), e))?;
        let mut errors = serde_json::from_str::<KairosErrorBody>(&text)
            .map(|b| b.errors)
            .unwrap_or_default();
        if errors.is_empty() {
            errors.push(format!("HTTP {}: {}", status.as_u16(), text.trim()));
        }

        Ok(PushResponse::with_errors(errors))
    }

    fn shutdown(self) -> Result<(), SinkError> {
        drop(self.http);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    #[test]
    fn test_encode_groups_series() {
        let mut batch = Batch::new("observations");
        batch.push(Point::new("Z1.A1.D1.temp", 1000, 21.5).with_tag("observationKind", "temp"));
        batch.push(Point::new("Z1.A1.D1.temp", 2000, 22_i64).with_tag("observationKind", "temp"));
        batch.push(Point::new("Z1.A1.D2.door", 3000, "open"));

        let json: serde_json::Value =
            serde_json::from_str(&encode_batch(&batch).unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!([
                {
                    "name": "Z1.A1.D1.temp",
                    "tags": { "observationKind": "temp" },
                    "datapoints": [[1000, 21.5], [2000, 22]]
                },
                {
                    "name": "Z1.A1.D2.door",
                    "tags": {},
                    "datapoints": [[3000, "open"]]
                }
            ])
        );
    }

    #[test]
    fn test_blank_url_rejected() {
        let err = KairosDestination::new("kairos", "", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let d = KairosDestination::new("kairos", "http://localhost:8080/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(d.url(), "http://localhost:8080");
        assert_eq!(d.describe(), "KairosDB (kairos - http://localhost:8080)");
    }
}
