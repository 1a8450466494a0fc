//! Job lifecycle: create, poll, collect exactly once

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::future::{join_all, try_join_all};
use imagebatch_config::BatchSettings;
use imagebatch_telemetry::BatchMetrics;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    artifact::ArtifactStore,
    error::{BatchError, Result},
    model::BatchProviderKind,
    partition::{Partition, partition},
    provider::{BatchProvider, ImageGenerator, ProbeOutcome, ProviderRecord},
    store::{Job, JobStore, SubJob},
    sync_exec::run_synchronous,
    types::{GeneratedImage, JobStatus, RequestItem, ResultItem, RoutedItem},
};

/// Error reported for an item the provider never returned a record for
pub const NO_RESULT: &str = "no result returned by provider";

/// Timing and retry knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub probe_attempts: u32,
    pub probe_backoff: Duration,
    pub max_probe_failures: u32,
    pub sync_concurrency: usize,
    pub job_retention: Duration,
}

impl PollPolicy {
    pub fn from_settings(settings: &BatchSettings) -> anyhow::Result<Self> {
        Ok(Self {
            probe_attempts: settings.probe_attempts.max(1),
            probe_backoff: settings.probe_backoff()?,
            max_probe_failures: settings.max_probe_failures.max(1),
            sync_concurrency: settings.sync_concurrency.max(1),
            job_retention: settings.job_retention()?,
        })
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(250),
            max_probe_failures: 30,
            sync_concurrency: 4,
            job_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Coordinates synchronous generation, provider batches and the job store
///
/// There is no background work: batches only advance when a caller asks
/// for a job's status.
pub struct BatchOrchestrator {
    batch_providers: IndexMap<BatchProviderKind, Arc<dyn BatchProvider>>,
    generator: Option<Arc<dyn ImageGenerator>>,
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    policy: PollPolicy,
    metrics: BatchMetrics,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn JobStore>, artifacts: Arc<dyn ArtifactStore>, policy: PollPolicy) -> Self {
        Self {
            batch_providers: IndexMap::new(),
            generator: None,
            store,
            artifacts,
            policy,
            metrics: BatchMetrics::new(),
        }
    }

    /// Register the client serving one batch provider, replacing any earlier one
    #[must_use]
    pub fn with_batch_provider(mut self, provider: Arc<dyn BatchProvider>) -> Self {
        self.batch_providers.insert(provider.kind(), provider);
        self
    }

    /// Register the client for synchronous-only models
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn has_batch_provider(&self, kind: BatchProviderKind) -> bool {
        self.batch_providers.contains_key(&kind)
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Validate, route and start a batch, returning its job id
    ///
    /// Synchronous items are generated before this returns, concurrently
    /// with the provider batch submissions. If any submission fails the
    /// whole call fails and no job is stored.
    pub async fn create_batch(&self, requests: Vec<RequestItem>) -> Result<String> {
        let started = Instant::now();
        self.evict_expired().await;

        let correlation_ids: Vec<String> = requests.iter().map(|r| r.correlation_id.clone()).collect();
        let Partition { batches, synchronous } = partition(requests)?;

        let mut groups = Vec::with_capacity(batches.len());
        for (kind, items) in batches {
            let provider = self
                .batch_providers
                .get(&kind)
                .ok_or_else(|| not_configured(&items, kind.as_str()))?;
            groups.push((Arc::clone(provider), items));
        }

        let generator = if synchronous.is_empty() {
            None
        } else {
            Some(Arc::clone(
                self.generator
                    .as_ref()
                    .ok_or_else(|| not_configured(&synchronous, "synchronous"))?,
            ))
        };

        let submissions = try_join_all(groups.into_iter().map(|(provider, items)| submit_group(provider, items)));

        let generation = async move {
            match generator {
                Some(generator) => {
                    run_synchronous(
                        generator,
                        Arc::clone(&self.artifacts),
                        synchronous,
                        self.policy.sync_concurrency,
                    )
                    .await
                }
                None => Vec::new(),
            }
        };

        let (sub_jobs, completed) = tokio::join!(submissions, generation);

        let sub_jobs = sub_jobs.inspect_err(|e| {
            tracing::error!(error = %e, "batch submission failed, discarding batch");
        })?;

        let job_id = Uuid::new_v4().to_string();
        let item_count = correlation_ids.len();

        tracing::info!(
            job_id = %job_id,
            items = item_count,
            sub_jobs = sub_jobs.len(),
            synchronous = completed.len(),
            "batch job created"
        );

        self.store
            .insert(Job {
                id: job_id.clone(),
                created_at: SystemTime::now(),
                correlation_ids,
                sub_jobs,
                completed,
            })
            .await;

        self.metrics.job_created(started, item_count);

        Ok(job_id)
    }

    /// Report progress, or hand over the full result list exactly once
    ///
    /// Per-item failures only ever show up inside the completed result list.
    pub async fn get_status(&self, job_id: &str) -> Result<JobStatus> {
        let job = self
            .store
            .get(job_id)
            .await
            .ok_or_else(|| BatchError::JobNotFound(job_id.to_string()))?;

        let settled = join_all(job.sub_jobs.iter().map(|sub_job| self.refresh(job_id, sub_job))).await;

        if settled.iter().any(|terminal| !terminal) {
            tracing::debug!(job_id, "batch job still processing");
            return Ok(JobStatus::Processing);
        }

        // Only one concurrent poller wins the job; the others see it as gone
        let Some(job) = self.store.take(job_id).await else {
            tracing::debug!(job_id, "batch job already collected by another caller");
            return Err(BatchError::JobNotFound(job_id.to_string()));
        };

        let collected = join_all(job.sub_jobs.iter().map(|sub_job| self.collect(job_id, sub_job))).await;

        let results = merge_results(
            &job.correlation_ids,
            job.completed.iter().cloned().chain(collected.into_iter().flatten()),
        );

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;

        tracing::info!(job_id, succeeded, failed, "batch job completed");
        self.metrics.job_completed(succeeded as u64, failed as u64);

        Ok(JobStatus::Completed { results })
    }

    async fn evict_expired(&self) {
        let evicted = self.store.evict_older_than(self.policy.job_retention).await;

        if evicted > 0 {
            tracing::info!(evicted, "evicted expired batch jobs");
        }
    }

    /// Bring a sub-job's completion state up to date, returning whether it is terminal
    async fn refresh(&self, job_id: &str, sub_job: &SubJob) -> bool {
        if sub_job.is_terminal() {
            return true;
        }

        match self.probe_with_retry(sub_job).await {
            ProbeOutcome::Pending => {
                sub_job.reset_probe_failures();
                false
            }
            ProbeOutcome::Terminal { state } => {
                sub_job.reset_probe_failures();
                sub_job.mark_terminal();

                tracing::info!(
                    job_id,
                    provider = sub_job.provider.as_str(),
                    handle = %sub_job.handle,
                    state = %state,
                    "provider batch finished"
                );
                true
            }
            ProbeOutcome::Failed(e) => {
                let failures = sub_job.record_probe_failure();
                self.metrics.probe_failed(sub_job.provider.as_str());

                if failures >= self.policy.max_probe_failures {
                    tracing::error!(
                        job_id,
                        provider = sub_job.provider.as_str(),
                        handle = %sub_job.handle,
                        failures,
                        error = %e,
                        "giving up on provider batch"
                    );
                    sub_job.abandon(format!("provider status unavailable: {e}"));
                    true
                } else {
                    tracing::warn!(
                        job_id,
                        provider = sub_job.provider.as_str(),
                        handle = %sub_job.handle,
                        failures,
                        error = %e,
                        "provider status check failed"
                    );
                    false
                }
            }
        }
    }

    async fn probe_with_retry(&self, sub_job: &SubJob) -> ProbeOutcome {
        let Some(provider) = self.batch_providers.get(&sub_job.provider) else {
            return ProbeOutcome::Failed(BatchError::ProviderNotConfigured(sub_job.provider.as_str().to_string()));
        };

        let mut backoff = self.policy.probe_backoff;
        let mut attempt = 1;

        loop {
            match provider.probe(&sub_job.handle).await {
                ProbeOutcome::Failed(e) if attempt < self.policy.probe_attempts => {
                    tracing::debug!(
                        provider = sub_job.provider.as_str(),
                        attempt,
                        error = %e,
                        "retrying provider status check"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// One result per record the provider returned; gaps are filled by the merge
    async fn collect(&self, job_id: &str, sub_job: &SubJob) -> Vec<ResultItem> {
        if let Some(reason) = sub_job.abandoned_reason() {
            return fail_all(&sub_job.items, reason);
        }

        let records = match self.batch_providers.get(&sub_job.provider) {
            Some(provider) => provider.fetch_results(&sub_job.handle, &sub_job.items).await,
            None => Err(BatchError::ProviderNotConfigured(sub_job.provider.as_str().to_string())),
        };

        let records = match records {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    job_id,
                    provider = sub_job.provider.as_str(),
                    handle = %sub_job.handle,
                    error = %e,
                    "failed to collect provider batch"
                );
                return fail_all(&sub_job.items, &format!("failed to collect results: {e}"));
            }
        };

        if records.len() < sub_job.items.len() {
            tracing::warn!(
                job_id,
                provider = sub_job.provider.as_str(),
                expected = sub_job.items.len(),
                received = records.len(),
                "provider returned fewer records than submitted"
            );
        }

        let items: HashMap<&str, &RoutedItem> = sub_job
            .items
            .iter()
            .map(|item| (item.correlation_id.as_str(), item))
            .collect();

        // First record per submitted id wins; anything else would be saved and never referenced
        let mut seen = HashSet::with_capacity(records.len());
        let mut known: Vec<(&RoutedItem, ProviderRecord)> = Vec::with_capacity(records.len());

        for record in records {
            let Some(item) = items.get(record.correlation_id.as_str()).copied() else {
                tracing::warn!(
                    job_id,
                    correlation_id = %record.correlation_id,
                    "dropping record for an item that was never submitted"
                );
                continue;
            };

            if !seen.insert(item.correlation_id.as_str()) {
                tracing::warn!(
                    job_id,
                    correlation_id = %record.correlation_id,
                    "dropping duplicate provider record"
                );
                continue;
            }

            known.push((item, record));
        }

        join_all(known.into_iter().map(|(item, record)| self.persist(item, record))).await
    }

    async fn persist(&self, item: &RoutedItem, record: ProviderRecord) -> ResultItem {
        match record.outcome {
            Ok(bytes) => match self.artifacts.save(bytes).await {
                Ok(artifact_ref) => ResultItem::success(
                    record.correlation_id,
                    GeneratedImage {
                        artifact_ref,
                        provider_label: item.model.display_name().to_string(),
                    },
                ),
                Err(e) => ResultItem::error(record.correlation_id, e.to_string()),
            },
            Err(message) => ResultItem::error(record.correlation_id, message),
        }
    }
}

async fn submit_group(provider: Arc<dyn BatchProvider>, items: Vec<RoutedItem>) -> Result<SubJob> {
    let handle = provider.submit(&items).await?;

    tracing::debug!(
        provider = provider.kind().as_str(),
        handle = %handle,
        items = items.len(),
        "provider batch submitted"
    );

    Ok(SubJob::new(provider.kind(), handle, items))
}

fn not_configured(items: &[RoutedItem], fallback: &str) -> BatchError {
    let model = items.first().map_or(fallback, |item| item.model.name());
    BatchError::ProviderNotConfigured(model.to_string())
}

fn fail_all(items: &[RoutedItem], reason: &str) -> Vec<ResultItem> {
    items
        .iter()
        .map(|item| ResultItem::error(&item.correlation_id, reason))
        .collect()
}

/// Combine per-group results into one entry per submitted correlation id
///
/// Output follows `correlation_ids` order. Results for ids that were never
/// submitted are dropped, the first result wins on duplicates, and ids
/// with no result get a `NO_RESULT` error.
pub fn merge_results(correlation_ids: &[String], results: impl IntoIterator<Item = ResultItem>) -> Vec<ResultItem> {
    let expected: HashSet<&str> = correlation_ids.iter().map(String::as_str).collect();
    let mut by_id: HashMap<String, ResultItem> = HashMap::with_capacity(correlation_ids.len());

    for result in results {
        if !expected.contains(result.correlation_id.as_str()) {
            tracing::warn!(correlation_id = %result.correlation_id, "dropping result for unknown correlation id");
            continue;
        }

        if by_id.contains_key(&result.correlation_id) {
            tracing::warn!(correlation_id = %result.correlation_id, "dropping duplicate result");
            continue;
        }

        by_id.insert(result.correlation_id.clone(), result);
    }

    correlation_ids
        .iter()
        .map(|id| by_id.remove(id).unwrap_or_else(|| ResultItem::error(id, NO_RESULT)))
        .collect()
}
