//! Observability infrastructure
//!
//! Provides:
//! - Prometheus metrics (round latency, inference latency, camera coverage, errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for round and inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OccupancyMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct OccupancyMetricsInner {
    round_latency_seconds: Histogram,
    inference_latency_seconds: Histogram,
    locations_monitored: IntGauge,
    cameras_configured: IntGauge,
    camera_coverage_ratio: GaugeVec,
    rounds_completed: IntCounter,
    camera_failures: IntCounter,
    source_errors: IntCounterVec,
}

impl OccupancyMetricsInner {
    fn new() -> Self {
        Self {
            round_latency_seconds: register_histogram!(
                "occupancy_round_latency_seconds",
                "Time spent on one aggregation round across all cameras of a location",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register round_latency_seconds"),

            inference_latency_seconds: register_histogram!(
                "occupancy_inference_latency_seconds",
                "Time spent classifying the spot regions of one camera frame",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            locations_monitored: register_int_gauge!(
                "occupancy_locations_monitored",
                "Number of locations with known metadata"
            )
            .expect("Failed to register locations_monitored"),

            cameras_configured: register_int_gauge!(
                "occupancy_cameras_configured",
                "Number of cameras in the loaded topology"
            )
            .expect("Failed to register cameras_configured"),

            camera_coverage_ratio: register_gauge_vec!(
                "occupancy_camera_coverage_ratio",
                "Fraction of a location's cameras that contributed to the latest round",
                &["location"]
            )
            .expect("Failed to register camera_coverage_ratio"),

            rounds_completed: register_int_counter!(
                "occupancy_rounds_completed_total",
                "Total number of aggregation rounds completed"
            )
            .expect("Failed to register rounds_completed"),

            camera_failures: register_int_counter!(
                "occupancy_camera_failures_total",
                "Total number of cameras that failed to contribute to a round"
            )
            .expect("Failed to register camera_failures"),

            source_errors: register_int_counter_vec!(
                "occupancy_source_errors_total",
                "Total number of failed source calls",
                &["source", "call"]
            )
            .expect("Failed to register source_errors"),
        }
    }
}

/// Occupancy metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct OccupancyMetrics {
    _private: (),
}

impl Default for OccupancyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OccupancyMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OccupancyMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OccupancyMetricsInner {
        GLOBAL_METRICS.get_or_init(OccupancyMetricsInner::new)
    }

    pub fn observe_round_latency(&self, duration_secs: f64) {
        self.inner().round_latency_seconds.observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn set_locations_monitored(&self, count: i64) {
        self.inner().locations_monitored.set(count);
    }

    pub fn set_cameras_configured(&self, count: i64) {
        self.inner().cameras_configured.set(count);
    }

    /// Record the coverage of a location's latest round
    pub fn set_camera_coverage(&self, location: &str, ratio: f64) {
        self.inner()
            .camera_coverage_ratio
            .with_label_values(&[location])
            .set(ratio);
    }

    pub fn inc_rounds_completed(&self) {
        self.inner().rounds_completed.inc();
    }

    pub fn inc_camera_failures(&self) {
        self.inner().camera_failures.inc();
    }

    /// Count a failed `metadata` or `state` call of a source
    pub fn inc_source_errors(&self, source: &str, call: &str) {
        self.inner()
            .source_errors
            .with_label_values(&[source, call])
            .inc();
    }
}

/// Structured logger for occupancy events
///
/// Provides consistent JSON-formatted logging for rounds, camera failures
/// and source polling.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a completed aggregation round
    pub fn log_round(
        &self,
        location_id: &str,
        location: &str,
        cameras_succeeded: usize,
        cameras_total: usize,
        available_spots: u32,
        elapsed_ms: u64,
    ) {
        if cameras_succeeded < cameras_total {
            warn!(
                event = "round_completed",
                node = %self.node_name,
                location_id = %location_id,
                location = %location,
                cameras_succeeded = cameras_succeeded,
                cameras_total = cameras_total,
                available_spots = available_spots,
                elapsed_ms = elapsed_ms,
                "Round completed with missing cameras, counts are a lower bound"
            );
        } else {
            info!(
                event = "round_completed",
                node = %self.node_name,
                location_id = %location_id,
                location = %location,
                cameras_succeeded = cameras_succeeded,
                cameras_total = cameras_total,
                available_spots = available_spots,
                elapsed_ms = elapsed_ms,
                "Round completed"
            );
        }
    }

    /// Log a camera that did not contribute to a round
    pub fn log_camera_failure(&self, location: &str, camera: usize, url: &str, error: &str) {
        warn!(
            event = "camera_failed",
            node = %self.node_name,
            location = %location,
            camera = camera,
            url = %url,
            error = %error,
            "Camera contributed nothing to this round"
        );
    }

    /// Log a metadata refresh
    pub fn log_metadata_refresh(&self, source: &str, locations: usize) {
        info!(
            event = "metadata_refreshed",
            node = %self.node_name,
            source = %source,
            locations = locations,
            "Obtained metadata"
        );
    }

    /// Log a failed source call
    pub fn log_source_failure(&self, source: &str, call: &str, error: &str) {
        warn!(
            event = "source_failed",
            node = %self.node_name,
            source = %source,
            call = %call,
            error = %error,
            "Source call failed"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, sources: usize) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            sources = sources,
            "Occupancy agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Occupancy agent shutting down"
        );
    }
}
