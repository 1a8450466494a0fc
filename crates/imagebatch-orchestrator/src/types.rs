use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;
use crate::model::ImageModel;

/// Caller-supplied unit of work
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestItem {
    /// Caller-chosen id, unique within one batch
    pub correlation_id: String,
    /// Image prompt
    pub input: String,
    /// Target model name (e.g. "gpt-image-1")
    pub model: String,
}

/// Body of `POST /v1/images/batches`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateBatchRequest {
    pub requests: Vec<RequestItem>,
}

/// Job handle returned from batch creation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateBatchResponse {
    pub job_id: String,
}

/// A request item whose model has been resolved against the model table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedItem {
    pub correlation_id: String,
    pub input: String,
    pub model: ImageModel,
}

/// Reference to a persisted image and the model that produced it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratedImage {
    pub artifact_ref: ArtifactRef,
    pub provider_label: String,
}

/// Per-item outcome; exactly one of success or error
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(GeneratedImage),
    Error(String),
}

/// Outcome for one correlation id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResultItem {
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResultItem {
    pub fn success(correlation_id: impl Into<String>, image: GeneratedImage) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Outcome::Success(image),
        }
    }

    pub fn error(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Outcome::Error(message.into()),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }
}

/// Answer to a status query for a known job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// At least one provider sub-job is still running
    Processing,
    /// All sub-jobs finished; one result per submitted item
    Completed { results: Vec<ResultItem> },
}
