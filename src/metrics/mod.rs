//! Prometheus metrics for cluster scans
//!
//! Collected in a process-wide registry; `Metrics::gather` renders the text
//! exposition format.

use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use std::sync::OnceLock;

use crate::scan::ScanResult;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Scanner metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Completed scans by outcome
    pub scans_total: IntCounterVec,
    /// Scan wall time (in seconds)
    pub scan_duration_seconds: Histogram,
    /// Failed probes by probe and error kind
    pub probe_errors_total: IntCounterVec,
    /// Nodes by state as of the last scan
    pub nodes: IntGaugeVec,
    /// Per-node table size fetches by result
    pub table_size_fetches_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let scans_total = IntCounterVec::new(
            Opts::new("chscan_scans_total", "Total number of cluster scans"),
            &["outcome"], // healthy, unhealthy
        )
        .unwrap();

        let scan_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("chscan_scan_duration_seconds", "Cluster scan latency in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .unwrap();

        let probe_errors_total = IntCounterVec::new(
            Opts::new("chscan_probe_errors_total", "Total number of failed node probes"),
            &["probe", "kind"], // replicas/clusters x transport/query/timeout/decode
        )
        .unwrap();

        let nodes = IntGaugeVec::new(
            Opts::new("chscan_nodes", "Nodes by state in the last scan"),
            &["state"], // healthy, unhealthy, unreachable
        )
        .unwrap();

        let table_size_fetches_total = IntCounterVec::new(
            Opts::new(
                "chscan_table_size_fetches_total",
                "Total number of per-node table size queries",
            ),
            &["result"], // success, failure
        )
        .unwrap();

        registry.register(Box::new(scans_total.clone())).unwrap();
        registry
            .register(Box::new(scan_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(probe_errors_total.clone()))
            .unwrap();
        registry.register(Box::new(nodes.clone())).unwrap();
        registry
            .register(Box::new(table_size_fetches_total.clone()))
            .unwrap();

        Self {
            registry,
            scans_total,
            scan_duration_seconds,
            probe_errors_total,
            nodes,
            table_size_fetches_total,
        }
    }

    /// Record a finished scan
    pub fn record_scan(&self, result: &ScanResult) {
        let outcome = if result.is_healthy() { "healthy" } else { "unhealthy" };
        self.scans_total.with_label_values(&[outcome]).inc();
        self.scan_duration_seconds
            .observe(result.elapsed.as_secs_f64());

        let unreachable = result.bad_nodes.len() as i64;
        let healthy = result
            .verdicts
            .iter()
            .filter(|(node, v)| v.passed && !result.bad_nodes.contains_key(*node))
            .count() as i64;
        let unhealthy = result.nodes.len() as i64 - healthy - unreachable;
        self.nodes.with_label_values(&["healthy"]).set(healthy);
        self.nodes.with_label_values(&["unhealthy"]).set(unhealthy.max(0));
        self.nodes.with_label_values(&["unreachable"]).set(unreachable);
    }

    /// Record a failed probe
    pub fn record_probe_error(&self, probe: &str, kind: &str) {
        self.probe_errors_total
            .with_label_values(&[probe, kind])
            .inc();
    }

    /// Record a per-node table size query
    pub fn record_table_size_fetch(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.table_size_fetches_total
            .with_label_values(&[result])
            .inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {e}\n");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
