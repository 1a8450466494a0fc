use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level image generation configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageGenConfig {
    /// Image generation provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ImageGenProviderConfig>,
    /// Batch orchestration tuning
    #[serde(default)]
    pub batch: BatchSettings,
}

/// Configuration for a single image generation provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageGenProviderConfig {
    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: ImageGenProviderType,
    /// API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// Supported image generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageGenProviderType {
    /// `OpenAI` Batch API (GPT Image models)
    Openai,
    /// Google Generative Language API (Gemini batch and Imagen)
    Google,
}

/// Knobs for job polling and batch creation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSettings {
    /// Status probe attempts per sub-job within a single status query
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    /// Delay before the first probe retry, doubled on each further retry
    #[serde(default = "default_probe_backoff")]
    pub probe_backoff: String,
    /// Consecutive failed status queries before a sub-job is given up on
    #[serde(default = "default_max_probe_failures")]
    pub max_probe_failures: u32,
    /// Synchronous-provider items generated concurrently during batch creation
    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,
    /// Age after which a job that was never collected is evicted
    #[serde(default = "default_job_retention")]
    pub job_retention: String,
}

impl BatchSettings {
    /// Parsed `probe_backoff`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn probe_backoff(&self) -> anyhow::Result<Duration> {
        parse_duration("imagegen.batch.probe_backoff", &self.probe_backoff)
    }

    /// Parsed `job_retention`
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid duration string
    pub fn job_retention(&self) -> anyhow::Result<Duration> {
        parse_duration("imagegen.batch.job_retention", &self.job_retention)
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            probe_attempts: default_probe_attempts(),
            probe_backoff: default_probe_backoff(),
            max_probe_failures: default_max_probe_failures(),
            sync_concurrency: default_sync_concurrency(),
            job_retention: default_job_retention(),
        }
    }
}

fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))
}

#[allow(clippy::missing_const_for_fn)]
fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_backoff() -> String {
    "250ms".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_probe_failures() -> u32 {
    30
}

#[allow(clippy::missing_const_for_fn)]
fn default_sync_concurrency() -> usize {
    4
}

fn default_job_retention() -> String {
    "24h".to_string()
}
