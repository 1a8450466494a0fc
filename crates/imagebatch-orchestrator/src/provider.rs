pub(crate) mod google;
pub(crate) mod imagen;
pub(crate) mod openai;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Response;

use crate::{
    error::{BatchError, Result},
    model::BatchProviderKind,
    types::RoutedItem,
};

/// Appended to every prompt so generated flashcard images carry no captions
const NO_TEXT_SUFFIX: &str = ". Avoid using text.";

/// Result of asking a provider whether a batch has finished
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Still queued or running
    Pending,
    /// Finished, successfully or not; results can be fetched
    Terminal { state: String },
    /// The status lookup itself failed; says nothing about the batch
    Failed(BatchError),
}

/// One output record from a provider batch, re-associated by correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    pub correlation_id: String,
    pub outcome: std::result::Result<Vec<u8>, String>,
}

impl ProviderRecord {
    pub fn image(correlation_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Ok(bytes),
        }
    }

    pub fn error(correlation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Err(message.into()),
        }
    }
}

/// Provider with an asynchronous, multi-item batch API
#[async_trait]
pub trait BatchProvider: Send + Sync {
    fn kind(&self) -> BatchProviderKind;

    /// Submit all items as one external batch, returning its handle
    async fn submit(&self, items: &[RoutedItem]) -> Result<String>;

    /// Non-blocking completion check
    async fn probe(&self, handle: &str) -> ProbeOutcome;

    /// Pull the output of a finished batch
    ///
    /// May return fewer records than `items` when the provider under-delivers.
    async fn fetch_results(&self, handle: &str, items: &[RoutedItem]) -> Result<Vec<ProviderRecord>>;
}

/// Provider that only generates one image per blocking call
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, item: &RoutedItem) -> Result<Vec<u8>>;
}

pub(crate) fn decorate_prompt(input: &str) -> String {
    format!("{input}{NO_TEXT_SUFFIX}")
}

pub(crate) fn decode_image(encoded: &str) -> std::result::Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("Invalid image data: {e}"))
}

/// Map transport failures to a connection error
pub(crate) fn connection_error(provider: &str, e: &reqwest::Error) -> BatchError {
    tracing::error!(provider, error = %e, "provider request failed");
    BatchError::ConnectionError(format!("Failed to reach {provider}: {e}"))
}

/// Turn a non-success HTTP status into a provider API error
pub(crate) async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    tracing::error!(provider, status = %status, "provider API error");

    Err(BatchError::ProviderApiError {
        status: status.as_u16(),
        message: error_text,
    })
}

/// Deserialize a JSON body, reporting malformed payloads as invalid responses
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    response.json().await.map_err(|e| {
        tracing::error!(provider, error = %e, "failed to parse provider response");
        BatchError::InvalidResponse(format!("{provider}: {e}"))
    })
}
