//! Telemetry configuration from environment variables.

use serde::Deserialize;
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name stamped on log lines
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full EnvFilter directive
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Optional Prometheus textfile written on shutdown
    pub metrics_file: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "telemetry-anchor".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_file: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ANCHOR_SERVICE_NAME`: Service name (default: telemetry-anchor)
    /// - `ANCHOR_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `ANCHOR_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `ANCHOR_METRICS_FILE`: Prometheus textfile path (default: unset)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        if let Ok(name) = env::var("ANCHOR_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Ok(level) = env::var("ANCHOR_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        self.json_logs = env::var("ANCHOR_JSON_LOGS")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(self.json_logs || is_container);
        if let Ok(path) = env::var("ANCHOR_METRICS_FILE") {
            self.metrics_file = Some(path).filter(|p| !p.is_empty());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "telemetry-anchor");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_file.is_none());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"log_level": "debug"}"#).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_name, "telemetry-anchor");
    }
}
