//! Prometheus metrics for message consumption.
//!
//! Metrics are registered on a caller-supplied [`Registry`] rather than the
//! process-wide default one, so several consumers (or tests) can coexist in
//! one process without name clashes.

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use queue_worker_runtime::QueueUrl;
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Namespace prefixed to every metric name
pub const NAMESPACE: &str = "queue_worker";

const QUEUE_LABELS: &[&str] = &["app", "queue"];
const ROUTED_LABELS: &[&str] = &["app", "queue", "msg_type"];

/// Consumer metrics, labelled by application and queue
#[derive(Debug, Clone)]
pub struct ConsumerMetrics {
    app: String,
    messages_received: IntCounterVec,
    messages_processed: IntCounterVec,
    messages_processed_failure: IntCounterVec,
    messages_deleted: IntCounterVec,
    messages_routed: IntCounterVec,
    processing_duration: HistogramVec,
}

impl ConsumerMetrics {
    /// Create the consumer metrics for `app` and register them on `registry`.
    ///
    /// # Errors
    ///
    /// Fails if `registry` already holds metrics with the same names.
    pub fn new(app: impl Into<String>, registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str, labels: &[&str]| {
            let counter = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
            registry.register(Box::new(counter.clone()))?;
            Ok::<_, prometheus::Error>(counter)
        };

        let processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "message_processing_duration_seconds",
                "Time spent handling a message, excluding the delete call",
            )
            .namespace(NAMESPACE),
            QUEUE_LABELS,
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        Ok(Self {
            app: app.into(),
            messages_received: counter(
                "messages_received_total",
                "Messages received from the queue",
                QUEUE_LABELS,
            )?,
            messages_processed: counter(
                "messages_processed_total",
                "Messages whose handler succeeded",
                QUEUE_LABELS,
            )?,
            messages_processed_failure: counter(
                "messages_processed_failure_total",
                "Messages whose handler failed",
                QUEUE_LABELS,
            )?,
            messages_deleted: counter(
                "messages_deleted_total",
                "Messages deleted from the queue after successful handling",
                QUEUE_LABELS,
            )?,
            messages_routed: counter(
                "messages_routed_total",
                "Messages dispatched to a registered handler, by type",
                ROUTED_LABELS,
            )?,
            processing_duration,
        })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Metric handles bound to one queue
    pub fn for_queue(&self, queue: &QueueUrl) -> QueueMetrics {
        let labels = [self.app.as_str(), queue.name()];

        QueueMetrics {
            received: self.messages_received.with_label_values(&labels),
            processed: self.messages_processed.with_label_values(&labels),
            processed_failure: self.messages_processed_failure.with_label_values(&labels),
            deleted: self.messages_deleted.with_label_values(&labels),
            processing_duration: self.processing_duration.with_label_values(&labels),
        }
    }

    /// Count a message handed to the handler registered for `msg_type`
    pub fn record_routed(&self, queue: &QueueUrl, msg_type: &str) {
        self.messages_routed
            .with_label_values(&[self.app.as_str(), queue.name(), msg_type])
            .inc();
    }

    pub fn routed_count(&self, queue: &QueueUrl, msg_type: &str) -> u64 {
        self.messages_routed
            .with_label_values(&[self.app.as_str(), queue.name(), msg_type])
            .get()
    }
}

/// Per-queue metric handles held by a worker
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    received: IntCounter,
    processed: IntCounter,
    processed_failure: IntCounter,
    deleted: IntCounter,
    processing_duration: Histogram,
}

impl QueueMetrics {
    pub fn record_received(&self, count: usize) {
        self.received.inc_by(count as u64);
    }

    pub fn record_processed(&self) {
        self.processed.inc();
    }

    pub fn record_processing_failure(&self) {
        self.processed_failure.inc();
    }

    pub fn record_deleted(&self) {
        self.deleted.inc();
    }

    pub fn observe_processing_duration(&self, elapsed: Duration) {
        self.processing_duration.observe(elapsed.as_secs_f64());
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn processed(&self) -> u64 {
        self.processed.get()
    }

    pub fn processed_failure(&self) -> u64 {
        self.processed_failure.get()
    }

    pub fn deleted(&self) -> u64 {
        self.deleted.get()
    }

    /// Number of processing durations observed
    pub fn processing_observations(&self) -> u64 {
        self.processing_duration.get_sample_count()
    }
}
