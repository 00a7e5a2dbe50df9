//! Observability infrastructure for the cost model
//!
//! Provides:
//! - Prometheus metrics for cluster map refreshes and pricing updates
//! - Structured JSON logging of lifecycle events with tracing
//!
//! Metrics are registered into a [`Registry`] owned by the caller rather than
//! the process-global default registry. The composition root creates the
//! registry once at startup, registers [`CostModelMetrics`] into it, and
//! unregisters them on shutdown.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::{info, warn};

/// Histogram buckets for cluster refresh latency (in seconds)
///
/// Refreshes include the retry delays, so the upper buckets reach into minutes.
const REFRESH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

const OUTCOME_LABEL: &str = "outcome";

/// Cost model metrics for Prometheus exposition
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct CostModelMetrics {
    cluster_map_size: IntGauge,
    cluster_refreshes: IntCounterVec,
    cluster_refresh_latency_seconds: Histogram,
    cluster_rows_skipped: IntCounter,
    pricing_rebuilds: IntCounter,
    pricing_config_updates: IntCounterVec,
}

impl CostModelMetrics {
    /// Create the collectors and register them into `registry`.
    ///
    /// Registering twice into the same registry fails with
    /// `prometheus::Error::AlreadyReg`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            cluster_map_size: IntGauge::new(
                "cost_model_cluster_map_clusters",
                "Number of clusters in the current cluster map snapshot",
            )?,
            cluster_refreshes: IntCounterVec::new(
                Opts::new(
                    "cost_model_cluster_map_refreshes_total",
                    "Cluster map refresh attempts by outcome",
                ),
                &[OUTCOME_LABEL],
            )?,
            cluster_refresh_latency_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "cost_model_cluster_map_refresh_latency_seconds",
                    "Time spent loading cluster info, including retries",
                )
                .buckets(REFRESH_BUCKETS.to_vec()),
            )?,
            cluster_rows_skipped: IntCounter::new(
                "cost_model_cluster_info_rows_skipped_total",
                "Cluster info rows skipped because id or name was missing",
            )?,
            pricing_rebuilds: IntCounter::new(
                "cost_model_pricing_rebuilds_total",
                "Number of node rate table rebuilds",
            )?,
            pricing_config_updates: IntCounterVec::new(
                Opts::new(
                    "cost_model_pricing_config_updates_total",
                    "Pricing configuration updates by outcome",
                ),
                &[OUTCOME_LABEL],
            )?,
        };

        registry.register(Box::new(metrics.cluster_map_size.clone()))?;
        registry.register(Box::new(metrics.cluster_refreshes.clone()))?;
        registry.register(Box::new(metrics.cluster_refresh_latency_seconds.clone()))?;
        registry.register(Box::new(metrics.cluster_rows_skipped.clone()))?;
        registry.register(Box::new(metrics.pricing_rebuilds.clone()))?;
        registry.register(Box::new(metrics.pricing_config_updates.clone()))?;

        Ok(metrics)
    }

    /// Remove the collectors from `registry`
    pub fn unregister(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.unregister(Box::new(self.cluster_map_size.clone()))?;
        registry.unregister(Box::new(self.cluster_refreshes.clone()))?;
        registry.unregister(Box::new(self.cluster_refresh_latency_seconds.clone()))?;
        registry.unregister(Box::new(self.cluster_rows_skipped.clone()))?;
        registry.unregister(Box::new(self.pricing_rebuilds.clone()))?;
        registry.unregister(Box::new(self.pricing_config_updates.clone()))?;
        Ok(())
    }

    /// Record a successful refresh
    pub fn observe_cluster_refresh(&self, duration_secs: f64, clusters: usize) {
        self.cluster_refresh_latency_seconds.observe(duration_secs);
        self.cluster_refreshes.with_label_values(&["success"]).inc();
        self.cluster_map_size.set(clusters as i64);
    }

    /// Record a refresh that failed after all retries
    pub fn observe_cluster_refresh_failure(&self, duration_secs: f64) {
        self.cluster_refresh_latency_seconds.observe(duration_secs);
        self.cluster_refreshes.with_label_values(&["failure"]).inc();
    }

    /// Increment the skipped rows counter
    pub fn inc_rows_skipped(&self) {
        self.cluster_rows_skipped.inc();
    }

    /// Increment the rate table rebuild counter
    pub fn inc_pricing_rebuilds(&self) {
        self.pricing_rebuilds.inc();
    }

    /// Record the outcome of a pricing configuration update
    pub fn record_config_update(&self, success: bool) {
        let outcome = if success { "success" } else { "rejected" };
        self.pricing_config_updates
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn cluster_map_size(&self) -> i64 {
        self.cluster_map_size.get()
    }

    pub fn cluster_refreshes(&self, outcome: &str) -> u64 {
        self.cluster_refreshes.with_label_values(&[outcome]).get()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.cluster_rows_skipped.get()
    }

    pub fn pricing_rebuilds(&self) -> u64 {
        self.pricing_rebuilds.get()
    }

    pub fn config_updates(&self, outcome: &str) -> u64 {
        self.pricing_config_updates
            .with_label_values(&[outcome])
            .get()
    }
}

/// Structured logger for cost model lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_id: String,
}

impl StructuredLogger {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, backend: &str) {
        info!(
            event = "cost_model_started",
            cluster_id = %self.cluster_id,
            version = %version,
            backend = %backend,
            "Cost model started"
        );
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "cost_model_shutdown",
            cluster_id = %self.cluster_id,
            reason = %reason,
            "Cost model shutting down"
        );
    }

    /// Log the outcome of a pricing configuration update
    pub fn log_pricing_config_update(&self, update_type: &str, success: bool, detail: &str) {
        if success {
            info!(
                event = "pricing_config_updated",
                cluster_id = %self.cluster_id,
                update_type = %update_type,
                "Pricing configuration updated"
            );
        } else {
            warn!(
                event = "pricing_config_rejected",
                cluster_id = %self.cluster_id,
                update_type = %update_type,
                error = %detail,
                "Pricing configuration update rejected"
            );
        }
    }
}
