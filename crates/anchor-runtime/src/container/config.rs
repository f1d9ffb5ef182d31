//! # Runtime Configuration
//!
//! One TOML file with a section per external system. Every field has a
//! default; environment variables override the file.
//!
//! ```toml
//! [document_store]
//! path = "/var/lib/telemetry-anchor/documents"
//!
//! [sensor_store]
//! url = "http://influxdb:8086"
//! database = "sensors"
//!
//! [anchor]
//! endpoint = "http://ledger:8080/anchor"
//!
//! [pipeline]
//! max_concurrent_runs = 8
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ANCHOR_DOCUMENT_STORE_PATH` | `document_store.path` |
//! | `ANCHOR_SENSOR_STORE_URL` | `sensor_store.url` |
//! | `ANCHOR_SENSOR_STORE_DATABASE` | `sensor_store.database` |
//! | `ANCHOR_SENSOR_STORE_USERNAME` | `sensor_store.username` |
//! | `ANCHOR_SENSOR_STORE_PASSWORD` | `sensor_store.password` |
//! | `ANCHOR_LEDGER_ENDPOINT` | `anchor.endpoint` |
//! | `ANCHOR_MAX_CONCURRENT_RUNS` | `pipeline.max_concurrent_runs` |
//!
//! Logging variables are handled by `anchor_telemetry::TelemetryConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anchor_pipeline::adapters::{AnchorEncoding, InfluxSchema, InfluxSettings};
use anchor_pipeline::RetryPolicy;
use anchor_telemetry::TelemetryConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::adapters::storage::RocksDbConfig;
use crate::wiring::DispatcherConfig;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Event records, audit log and resume token.
    pub document_store: DocumentStoreConfig,
    /// Time-series store holding the readings.
    pub sensor_store: SensorStoreConfig,
    /// Ledger endpoint.
    pub anchor: LedgerConfig,
    /// Worker pool and retry tuning.
    pub pipeline: PipelineSection,
    /// Logging and metrics.
    pub telemetry: TelemetryConfig,
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub path: PathBuf,
    /// Change feed poll interval when no append wakes it (ms).
    pub poll_interval_ms: u64,
    /// fsync every write.
    pub sync_writes: bool,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/documents"),
            poll_interval_ms: 250,
            sync_writes: true,
        }
    }
}

/// InfluxDB configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorStoreConfig {
    pub url: String,
    pub database: String,
    pub measurement: String,
    pub timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SensorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "sensors".to_string(),
            measurement: "env".to_string(),
            timeout_secs: 10,
            username: None,
            password: None,
        }
    }
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub encoding: AnchorEncoding,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/hash".to_string(),
            timeout_secs: 10,
            encoding: AnchorEncoding::Form,
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_concurrent_runs: usize,
    pub shutdown_timeout_secs: u64,
    pub anchor_max_attempts: u32,
    pub anchor_initial_backoff_ms: u64,
    pub anchor_max_backoff_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_concurrent_runs: 8,
            shutdown_timeout_secs: 30,
            anchor_max_attempts: retry.max_attempts,
            anchor_initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            anchor_max_backoff_ms: retry.max_backoff.as_millis() as u64,
        }
    }
}

impl PipelineSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.anchor_max_attempts,
            initial_backoff: Duration::from_millis(self.anchor_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.anchor_max_backoff_ms),
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent_runs: self.max_concurrent_runs,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config file {0} not found")]
    Missing(PathBuf),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AnchorConfig {
    /// Default config file location.
    pub const DEFAULT_PATH: &'static str = "anchor.toml";

    /// Load from `path`. A missing file is an error only when `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    Err(ConfigError::Missing(path.to_path_buf()))
                } else {
                    Ok(Self::default())
                }
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ANCHOR_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("ANCHOR_DOCUMENT_STORE_PATH") {
            self.document_store.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("ANCHOR_SENSOR_STORE_URL") {
            self.sensor_store.url = url;
        }
        if let Some(database) = lookup("ANCHOR_SENSOR_STORE_DATABASE") {
            self.sensor_store.database = database;
        }
        if let Some(username) = lookup("ANCHOR_SENSOR_STORE_USERNAME") {
            self.sensor_store.username = Some(username);
        }
        if let Some(password) = lookup("ANCHOR_SENSOR_STORE_PASSWORD") {
            self.sensor_store.password = Some(password);
        }
        if let Some(endpoint) = lookup("ANCHOR_LEDGER_ENDPOINT") {
            self.anchor.endpoint = endpoint;
        }
        if let Some(runs) = lookup("ANCHOR_MAX_CONCURRENT_RUNS") {
            self.pipeline.max_concurrent_runs =
                runs.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "ANCHOR_MAX_CONCURRENT_RUNS",
                    reason: format!("`{runs}` is not a worker count"),
                })?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        self.telemetry = self.telemetry.with_env_overrides();
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.max_concurrent_runs",
                reason: "must be at least 1".into(),
            });
        }
        if self.pipeline.anchor_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.anchor_max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.pipeline.anchor_initial_backoff_ms > self.pipeline.anchor_max_backoff_ms {
            return Err(ConfigError::Invalid {
                field: "pipeline.anchor_initial_backoff_ms",
                reason: "exceeds anchor_max_backoff_ms".into(),
            });
        }
        for (field, url) in [
            ("sensor_store.url", &self.sensor_store.url),
            ("anchor.endpoint", &self.anchor.endpoint),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("`{url}` is not an http(s) URL"),
                });
            }
        }
        if self.sensor_store.database.is_empty() {
            return Err(ConfigError::Invalid {
                field: "sensor_store.database",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn rocksdb(&self) -> RocksDbConfig {
        RocksDbConfig {
            path: self.document_store.path.to_string_lossy().to_string(),
            sync_writes: self.document_store.sync_writes,
            ..Default::default()
        }
    }

    pub fn influx(&self) -> InfluxSettings {
        InfluxSettings {
            url: self.sensor_store.url.clone(),
            database: self.sensor_store.database.clone(),
            username: self.sensor_store.username.clone(),
            password: self.sensor_store.password.clone(),
            timeout: Duration::from_secs(self.sensor_store.timeout_secs),
            schema: InfluxSchema {
                measurement: self.sensor_store.measurement.clone(),
                ..Default::default()
            },
        }
    }
}
