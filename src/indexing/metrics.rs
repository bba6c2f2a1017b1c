//! Prometheus metrics for the indexing pipeline

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

/// Indexing metrics collection
pub struct IndexerMetrics {
    /// Entries waiting in the index queue
    pub queue_depth: Gauge,

    /// Records accepted by the queue
    pub enqueued_total: CounterVec,

    /// Documents applied to the index
    pub documents_total: CounterVec,

    /// Drain cycle duration in seconds
    pub cycle_duration: HistogramVec,

    /// Index repairs after corruption
    pub repairs_total: CounterVec,

    /// Rebuild requests by outcome
    pub rebuilds_total: CounterVec,

    /// Content change notifications handled
    pub events_total: CounterVec,
}

impl IndexerMetrics {
    pub fn new() -> Self {
        Self {
            queue_depth: register_gauge!(
                "wiki_indexer_queue_depth",
                "Number of entries waiting in the index queue"
            )
            .unwrap(),

            enqueued_total: register_counter_vec!(
                "wiki_indexer_enqueued_total",
                "Total number of records enqueued",
                &["kind"]
            )
            .unwrap(),

            documents_total: register_counter_vec!(
                "wiki_indexer_documents_total",
                "Total number of documents applied to the index",
                &["operation"]
            )
            .unwrap(),

            cycle_duration: register_histogram_vec!(
                "wiki_indexer_cycle_duration_seconds",
                "Drain cycle duration in seconds",
                &["outcome"],
                vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
            )
            .unwrap(),

            repairs_total: register_counter_vec!(
                "wiki_indexer_repairs_total",
                "Total number of index repairs",
                &["outcome"]
            )
            .unwrap(),

            rebuilds_total: register_counter_vec!(
                "wiki_indexer_rebuilds_total",
                "Total number of rebuild requests",
                &["outcome"]
            )
            .unwrap(),

            events_total: register_counter_vec!(
                "wiki_indexer_events_total",
                "Total number of content change notifications",
                &["event"]
            )
            .unwrap(),
        }
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn record_enqueued(&self, kind: &str) {
        self.enqueued_total.with_label_values(&[kind]).inc();
    }

    /// Record the outcome of one drain cycle
    pub fn record_cycle(&self, indexed: usize, deleted: usize, failed: usize, success: bool, duration_secs: f64) {
        self.documents_total
            .with_label_values(&["indexed"])
            .inc_by(indexed as f64);
        self.documents_total
            .with_label_values(&["deleted"])
            .inc_by(deleted as f64);
        self.documents_total
            .with_label_values(&["failed"])
            .inc_by(failed as f64);

        let outcome = if success { "success" } else { "failure" };
        self.cycle_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_repair(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.repairs_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_rebuild(&self, outcome: &str) {
        self.rebuilds_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_event(&self, event: &str) {
        self.events_total.with_label_values(&[event]).inc();
    }
}

impl Default for IndexerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Global indexing metrics instance
    pub static ref INDEXER_METRICS: IndexerMetrics = IndexerMetrics::new();
}

/// Initialize indexing metrics (idempotent)
pub fn init_indexer_metrics() {
    lazy_static::initialize(&INDEXER_METRICS);
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
