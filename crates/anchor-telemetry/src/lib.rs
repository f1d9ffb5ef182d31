//! # Anchor Telemetry
//!
//! Logging and metrics for the telemetry anchoring pipeline.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON
//! - **Metrics**: Prometheus counters and histograms for pipeline runs,
//!   ledger submissions and change-feed traffic
//!
//! ## Usage
//!
//! ```rust,ignore
//! use anchor_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let metrics = init_telemetry(&config)?;
//! // ...
//! let text = metrics.encode()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ANCHOR_SERVICE_NAME` | `telemetry-anchor` | Service name in logs |
//! | `ANCHOR_LOG_LEVEL` | `info` | Log level filter |
//! | `ANCHOR_JSON_LOGS` | `false` | JSON log lines |
//! | `ANCHOR_METRICS_FILE` | unset | Prometheus textfile written on shutdown |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_tracing};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ANCHOR_SUBMISSIONS, FEED_EVENTS,
    PIPELINE_RUNS, READINGS_HASHED, RUNS_IN_FLIGHT, RUN_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize tracing and register metrics.
///
/// Returns the metrics handle used to render the registry.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<MetricsHandle, TelemetryError> {
    // Initialize metrics first (synchronous, cannot conflict)
    let metrics_handle = register_metrics()?;

    init_tracing(config)?;

    Ok(metrics_handle)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
