//! Prometheus metrics for the anchoring pipeline.
//!
//! All metrics follow the naming convention: `anchor_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., pipeline_runs_total)
//! - **Gauge**: Value that can go up or down (e.g., runs_in_flight)
//! - **Histogram**: Distribution of values (e.g., run_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PIPELINE METRICS
    // =========================================================================

    /// Completed pipeline runs by terminal outcome
    pub static ref PIPELINE_RUNS: CounterVec = CounterVec::new(
        Opts::new("anchor_pipeline_runs_total", "Pipeline runs by outcome"),
        &["outcome"]  // outcome: written_back/first_sighting/no_telemetry/failed
    ).expect("metric creation failed");

    /// Runs currently executing on the worker pool
    pub static ref RUNS_IN_FLIGHT: Gauge = Gauge::new(
        "anchor_pipeline_runs_in_flight",
        "Number of pipeline runs currently executing"
    ).expect("metric creation failed");

    /// End-to-end run duration
    pub static ref RUN_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "anchor_pipeline_run_duration_seconds",
            "Time from dispatch to terminal state of one pipeline run"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("bucket layout"))
    ).expect("metric creation failed");

    /// Readings folded into digests
    pub static ref READINGS_HASHED: Counter = Counter::new(
        "anchor_readings_hashed_total",
        "Total telemetry readings included in canonical documents"
    ).expect("metric creation failed");

    // =========================================================================
    // LEDGER METRICS
    // =========================================================================

    /// Ledger submissions by result
    pub static ref ANCHOR_SUBMISSIONS: CounterVec = CounterVec::new(
        Opts::new("anchor_submissions_total", "Digest submissions to the ledger"),
        &["result"]  // result: accepted/rejected/unavailable
    ).expect("metric creation failed");

    // =========================================================================
    // CHANGE FEED METRICS
    // =========================================================================

    /// Change notifications received
    pub static ref FEED_EVENTS: CounterVec = CounterVec::new(
        Opts::new("anchor_feed_events_total", "Change feed notifications"),
        &["disposition"]  // disposition: dispatched/malformed
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render the registry in Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_registry(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already-registered collectors are kept.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(RUNS_IN_FLIGHT.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(READINGS_HASHED.clone()),
        Box::new(ANCHOR_SUBMISSIONS.clone()),
        Box::new(FEED_EVENTS.clone()),
    ];

    for metric in collectors {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
