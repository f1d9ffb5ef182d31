//! # InfluxDB Sensor Store
//!
//! Time-series adapter speaking the InfluxDB 1.x HTTP API.
//!
//! - Reads: `GET /query` with InfluxQL and bound parameters. Window bounds
//!   and locations are never interpolated into the query text.
//! - Writes: `POST /write` with line protocol at nanosecond precision. A
//!   point with the same measurement, tag set and timestamp replaces the
//!   stored one, which makes the digest writeback an upsert.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared_types::time::{end_of_millis, format_millis, format_nanos, parse_rfc3339};
use shared_types::{Digest, RawReading, ReadingTags, StoreError, TelemetryReading};

use crate::ports::{SensorStore, TelemetryQuery};

/// Column names of the telemetry measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxSchema {
    pub measurement: String,
    pub location: String,
    pub sensor_id: String,
    pub sensor_make: String,
    pub temperature: String,
    pub humidity: String,
    pub digest: String,
    pub city: String,
    pub country: String,
    pub company: String,
    pub site: String,
}

impl Default for InfluxSchema {
    fn default() -> Self {
        Self {
            measurement: "env".into(),
            location: "bizLocation".into(),
            sensor_id: "sID".into(),
            sensor_make: "sName".into(),
            temperature: "temp".into(),
            humidity: "humid".into(),
            digest: "hash".into(),
            city: "city".into(),
            country: "country".into(),
            company: "company".into(),
            site: "site".into(),
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub schema: InfluxSchema,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Series {
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Sensor store backed by InfluxDB 1.x.
pub struct InfluxSensorStore {
    client: Client,
    settings: InfluxSettings,
}

impl InfluxSensorStore {
    pub fn new(settings: InfluxSettings) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| StoreError::Rejected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.url.trim_end_matches('/'), path)
    }

    fn credentials(&self) -> Vec<(&'static str, String)> {
        match (&self.settings.username, &self.settings.password) {
            (Some(u), Some(p)) => vec![("u", u.clone()), ("p", p.clone())],
            _ => Vec::new(),
        }
    }

    /// InfluxQL text for a window query. Only identifiers are embedded.
    fn window_statement(&self) -> String {
        let schema = &self.settings.schema;
        let location = quote_identifier(&schema.location);
        format!(
            "SELECT * FROM {} WHERE time >= $from_time AND time <= $to_time \
             AND ({location} = $prev OR {location} = $present)",
            quote_identifier(&schema.measurement),
        )
    }

    fn window_params(query: &TelemetryQuery) -> Value {
        let prev = query.locations.first().cloned().unwrap_or_default();
        let present = query.locations.get(1).cloned().unwrap_or_else(|| prev.clone());
        serde_json::json!({
            "from_time": format_millis(&query.from_time),
            "present": present,
            "prev": prev,
            "to_time": format_nanos(&end_of_millis(query.to_time)),
        })
    }

    fn row_to_reading(&self, columns: &[String], row: &[Value]) -> Result<RawReading, StoreError> {
        let schema = &self.settings.schema;
        let column = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| row.get(i))
                .filter(|v| !v.is_null())
        };
        let text = |name: &str| column(name).and_then(Value::as_str).map(String::from);

        let timestamp = match column("time") {
            None => None,
            Some(value) => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| StoreError::Corrupt(format!("non-string time: {value}")))?;
                Some(
                    parse_rfc3339(raw)
                        .map_err(|e| StoreError::Corrupt(format!("bad time `{raw}`: {e}")))?,
                )
            }
        };

        Ok(RawReading {
            timestamp,
            location_id: text(schema.location.as_str()),
            sensor_id: text(schema.sensor_id.as_str()),
            sensor_make: text(schema.sensor_make.as_str()),
            temperature: column(schema.temperature.as_str()).and_then(Value::as_f64),
            humidity: column(schema.humidity.as_str()).and_then(Value::as_f64),
            tags: ReadingTags {
                city: text(schema.city.as_str()),
                country: text(schema.country.as_str()),
                company: text(schema.company.as_str()),
                site: text(schema.site.as_str()),
            },
            digest: text(schema.digest.as_str()),
        })
    }

    /// Line protocol for one reading carrying `digest`.
    fn point_line(&self, reading: &TelemetryReading, digest: &Digest) -> Result<String, StoreError> {
        let schema = &self.settings.schema;
        let nanos = reading.timestamp.timestamp_nanos_opt().ok_or_else(|| {
            StoreError::Rejected(format!(
                "timestamp {} outside nanosecond range",
                reading.timestamp
            ))
        })?;

        let mut tags: Vec<(&str, &str)> = vec![
            (schema.location.as_str(), reading.location_id.as_str()),
            (schema.sensor_id.as_str(), reading.sensor_id.as_str()),
            (schema.sensor_make.as_str(), reading.sensor_make.as_str()),
        ];
        for (key, value) in [
            (&schema.city, &reading.tags.city),
            (&schema.country, &reading.tags.country),
            (&schema.company, &reading.tags.company),
            (&schema.site, &reading.tags.site),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                tags.push((key.as_str(), value));
            }
        }
        tags.sort_by(|a, b| a.0.cmp(b.0));

        let mut line = escape_measurement(&schema.measurement);
        for (key, value) in tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push_str(&format!(
            " {}={},{}={},{}=\"{}\" {}",
            escape_tag(&schema.temperature),
            reading.temperature,
            escape_tag(&schema.humidity),
            reading.humidity,
            escape_tag(&schema.digest),
            escape_field_string(&digest.to_hex()),
            nanos
        ));
        Ok(line)
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn status_error(status: StatusCode, body: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(format!("{status}: {body}"))
    } else {
        StoreError::Rejected(format!("{status}: {body}"))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_field_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl SensorStore for InfluxSensorStore {
    async fn query_window(&self, query: &TelemetryQuery) -> Result<Vec<RawReading>, StoreError> {
        let statement = self.window_statement();
        let params = Self::window_params(query).to_string();

        let mut form: Vec<(&str, String)> = vec![
            ("db", self.settings.database.clone()),
            ("q", statement),
            ("params", params),
        ];
        form.extend(self.credentials());

        let response = self
            .client
            .get(self.endpoint("query"))
            .query(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Corrupt(format!("undecodable query response: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(StoreError::Rejected(error));
        }

        let mut readings = Vec::new();
        for result in parsed.results {
            if let Some(error) = result.error {
                return Err(StoreError::Rejected(error));
            }
            for series in result.series {
                for row in &series.values {
                    readings.push(self.row_to_reading(&series.columns, row)?);
                }
            }
        }

        tracing::debug!(rows = readings.len(), "influx window query");
        Ok(readings)
    }

    async fn write_digest(
        &self,
        readings: &[TelemetryReading],
        digest: &Digest,
    ) -> Result<usize, StoreError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let body = readings
            .iter()
            .map(|r| self.point_line(r, digest))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let mut params: Vec<(&str, String)> = vec![
            ("db", self.settings.database.clone()),
            ("precision", "ns".to_string()),
        ];
        params.extend(self.credentials());

        let response = self
            .client
            .post(self.endpoint("write"))
            .query(&params)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(readings.len())
    }
}
