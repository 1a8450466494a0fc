//! Batch orchestration instruments

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub const BATCH_JOBS_CREATED: &str = "imagebatch.jobs.created";
pub const BATCH_JOBS_COMPLETED: &str = "imagebatch.jobs.completed";
pub const BATCH_ITEMS: &str = "imagebatch.items";
pub const BATCH_PROBE_FAILURES: &str = "imagebatch.probe.failures";
pub const BATCH_CREATE_DURATION: &str = "imagebatch.create.duration";
pub const BATCH_SIZE: &str = "imagebatch.batch.size";

/// Instruments recorded by the batch orchestrator
///
/// Backed by the global meter provider, so they are no-ops until
/// telemetry export is configured.
#[derive(Clone)]
pub struct BatchMetrics {
    jobs_created: Counter<u64>,
    jobs_completed: Counter<u64>,
    items: Counter<u64>,
    probe_failures: Counter<u64>,
    create_duration: Histogram<f64>,
    batch_size: Histogram<u64>,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::from_meter(&opentelemetry::global::meter("imagebatch"))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            jobs_created: meter.u64_counter(BATCH_JOBS_CREATED).build(),
            jobs_completed: meter.u64_counter(BATCH_JOBS_COMPLETED).build(),
            items: meter
                .u64_counter(BATCH_ITEMS)
                .with_description("Per-item outcomes delivered to callers")
                .build(),
            probe_failures: meter.u64_counter(BATCH_PROBE_FAILURES).build(),
            create_duration: meter.f64_histogram(BATCH_CREATE_DURATION).with_unit("s").build(),
            batch_size: meter
                .u64_histogram(BATCH_SIZE)
                .with_description("Items per created batch job")
                .build(),
        }
    }

    pub fn job_created(&self, started: Instant, item_count: usize) {
        self.jobs_created.add(1, &[]);
        self.create_duration.record(started.elapsed().as_secs_f64(), &[]);
        self.batch_size.record(item_count as u64, &[]);
    }

    pub fn job_completed(&self, succeeded: u64, failed: u64) {
        self.jobs_completed.add(1, &[]);
        self.items.add(succeeded, &[KeyValue::new("outcome", "success")]);
        self.items.add(failed, &[KeyValue::new("outcome", "error")]);
    }

    pub fn probe_failed(&self, provider: &'static str) {
        self.probe_failures.add(1, &[KeyValue::new("provider", provider)]);
    }
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
