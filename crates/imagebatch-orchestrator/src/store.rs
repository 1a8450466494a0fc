//! Registry of in-flight batch jobs

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::BatchProviderKind;
use crate::types::{ResultItem, RoutedItem};

/// One provider's share of a job
#[derive(Debug)]
pub struct SubJob {
    pub provider: BatchProviderKind,
    /// Provider-issued batch handle
    pub handle: String,
    /// Items submitted under `handle`, in submission order
    pub items: Vec<RoutedItem>,
    terminal: AtomicBool,
    probe_failures: AtomicU32,
    abandoned: OnceLock<String>,
}

impl SubJob {
    pub fn new(provider: BatchProviderKind, handle: String, items: Vec<RoutedItem>) -> Self {
        Self {
            provider,
            handle,
            items,
            terminal: AtomicBool::new(false),
            probe_failures: AtomicU32::new(0),
            abandoned: OnceLock::new(),
        }
    }

    /// Whether the sub-job has been observed finished. Never reverts.
    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    pub fn mark_terminal(&self) {
        self.terminal.store(true, Ordering::Release);
    }

    /// Record a failed status query, returning the consecutive count
    pub fn record_probe_failure(&self) -> u32 {
        self.probe_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn reset_probe_failures(&self) {
        self.probe_failures.store(0, Ordering::Release);
    }

    /// Stop waiting on the provider; every item will be reported as failed
    pub fn abandon(&self, reason: String) {
        let _ = self.abandoned.set(reason);
        self.mark_terminal();
    }

    pub fn abandoned_reason(&self) -> Option<&str> {
        self.abandoned.get().map(String::as_str)
    }
}

/// A batch job awaiting collection
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub created_at: SystemTime,
    /// Correlation ids in submission order
    pub correlation_ids: Vec<String>,
    pub sub_jobs: Vec<SubJob>,
    /// Results from the synchronous path, computed before the job was stored
    pub completed: Vec<ResultItem>,
}

impl Job {
    pub fn age(&self) -> Duration {
        SystemTime::now().duration_since(self.created_at).unwrap_or_default()
    }
}

/// Storage for jobs between creation and collection
///
/// `take` is the single hand-off point: for any job id, at most one caller
/// ever receives the job from it.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job);

    /// Look up a job without removing it
    async fn get(&self, job_id: &str) -> Option<Arc<Job>>;

    /// Atomically remove and return a job
    async fn take(&self, job_id: &str) -> Option<Arc<Job>>;

    /// Drop jobs older than `max_age`, returning how many were removed
    async fn evict_older_than(&self, max_age: Duration) -> usize;

    async fn len(&self) -> usize;
}

/// Process-local job store
///
/// Sharded map, so inserts and removals on different ids do not contend.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, Arc<Job>>,
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) {
        self.jobs.insert(job.id.clone(), Arc::new(job));
    }

    async fn get(&self, job_id: &str) -> Option<Arc<Job>> {
        self.jobs.get(job_id).map(|entry| Arc::clone(entry.value()))
    }

    async fn take(&self, job_id: &str) -> Option<Arc<Job>> {
        self.jobs.remove(job_id).map(|(_, job)| job)
    }

    async fn evict_older_than(&self, max_age: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.age() <= max_age);
        before.saturating_sub(self.jobs.len())
    }

    async fn len(&self) -> usize {
        self.jobs.len()
    }
}
