// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 destination.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 value=<v> timestamp_ms
//! ```
//!
//! Each point becomes one line whose measurement is the point name and
//! whose single field is `value`. Lines are written with `precision=ms`.
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::batch::Batch;
use crate::error::SinkError;
use crate::point::{FieldValue, Point};
use crate::sink::{Destination, DestinationClient, PushResponse};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

/// Format a value for InfluxDB Line Protocol.
///
/// - Float: written as-is (e.g., `3.14`)
/// - Integer: suffixed with `i` (e.g., `42i`)
/// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
/// - Boolean: `true` or `false`
pub fn to_line_protocol(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::String(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        }
        FieldValue::Boolean(v) => v.to_string(),
    }
}

/// Accumulates Line Protocol lines.
pub struct LineProtocolWriter {
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write a point as a single line with field `value`.
    ///
    /// Tags come from a `BTreeMap`, so they are already in canonical
    /// (sorted) order.
    pub fn write_point(&mut self, point: &Point) {
        let mut line = escape_measurement(&point.name);

        for (key, value) in &point.tags {
            if value.is_empty() {
                // Line Protocol has no representation for empty tag values.
                continue;
            }
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }

        line.push_str(" value=");
        line.push_str(&to_line_protocol(&point.value));
        line.push(' ');
        line.push_str(&point.timestamp_ms.to_string());

        self.buffer.push(line);
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineProtocolWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape measurement name: spaces and commas.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag key or value: commas, equals signs, and spaces.
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Encode a whole batch as a newline-separated Line Protocol body.
pub fn encode_batch(batch: &Batch) -> String {
    let mut writer = LineProtocolWriter::new();
    for point in batch.points() {
        writer.write_point(point);
    }
    writer.flush().join("\n")
}

/// InfluxDB v2 connection settings.
#[derive(Debug, Clone)]
pub struct InfluxDestination {
    url: String,
    org: String,
    bucket: String,
    token: String,
    timeout: Duration,
}

impl InfluxDestination {
    /// Create a destination. The URL must not be blank.
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SinkError::Config("InfluxDB URL cannot be blank".into()));
        }
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
            timeout,
        })
    }
}

impl Destination for InfluxDestination {
    type Client = InfluxClient;

    fn describe(&self) -> String {
        format!("InfluxDB ({} - bucket {})", self.url, self.bucket)
    }

    fn connect(&self) -> Result<InfluxClient, SinkError> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SinkError::connect(self.describe(), e))?;

        let health = format!("{}/health", self.url);
        http.get(&health)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SinkError::connect(self.describe(), e))?;

        Ok(InfluxClient {
            http,
            destination: self.clone(),
        })
    }
}

/// Connected InfluxDB client.
pub struct InfluxClient {
    http: Client,
    destination: InfluxDestination,
}

#[derive(Debug, Deserialize)]
struct InfluxErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl DestinationClient for InfluxClient {
    fn push(&mut self, batch: &Batch) -> Result<PushResponse, SinkError> {
        let d = &self.destination;
        let url = format!("{}/api/v2/write", d.url);

        let response = self
            .http
            .post(&url)
            .query(&[
                ("org", d.org.as_str()),
                ("bucket", d.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Authorization", format!("Token {}", d.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(encode_batch(batch))
            .send()
            .map_err(|e| SinkError::push(d.describe(), e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(PushResponse::ok());
        }

        let body = response
            .text()
            .map_err(|e| SinkError::push(d.describe(), e))?;
        let message = serde_json::from_str::<InfluxErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        Ok(PushResponse::with_errors(vec![format!("HTTP {}: {}", status.as_u16(), message)]))
    }

    fn shutdown(self) -> Result<(), SinkError> {
        // The blocking client owns its pool; dropping it closes connections.
        drop(self.http);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_float() {
        assert_eq!(to_line_protocol(&FieldValue::Float(3.15)), "3.15");
    }

    #[test]
    fn test_field_value_integer() {
        assert_eq!(to_line_protocol(&FieldValue::Integer(42)), "42i");
    }

    #[test]
    fn test_field_value_string_with_quotes() {
        let v = FieldValue::String("say \"hi\"".to_string());
        assert_eq!(to_line_protocol(&v), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_field_value_boolean() {
        assert_eq!(to_line_protocol(&FieldValue::Boolean(true)), "true");
        assert_eq!(to_line_protocol(&FieldValue::Boolean(false)), "false");
    }

    #[test]
    fn test_line_protocol_with_tags() {
        let mut writer = LineProtocolWriter::new();
        writer.write_point(
            &Point::new("Z1.A1.D1.temp", 1_700_000_000_000, 23.5)
                .with_tag("sensor", "A1")
                .with_tag("location", "room1"),
        );

        let lines = writer.flush();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "Z1.A1.D1.temp,location=room1,sensor=A1 value=23.5 1700000000000"
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn test_line_protocol_escape_special_chars() {
        let mut writer = LineProtocolWriter::new();
        writer.write_point(
            &Point::new("my measurement", 3, "hello")
                .with_tag("tag key", "tag,value")
                .with_tag("empty", ""),
        );

        let lines = writer.flush();
        assert_eq!(
            lines[0],
            "my\\ measurement,tag\\ key=tag\\,value value=\"hello\" 3"
        );
    }

    #[test]
    fn test_encode_batch_joins_lines() {
        let mut batch = Batch::new("observations");
        batch.push(Point::new("a", 1, 1_i64));
        batch.push(Point::new("b", 2, 2.5));

        assert_eq!(encode_batch(&batch), "a value=1i 1\nb value=2.5 2");
    }

    #[test]
    fn test_blank_url_rejected() {
        let err = InfluxDestination::new(" ", "org", "bucket", "token", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }
}
