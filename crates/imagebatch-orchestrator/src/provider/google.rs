//! Gemini Batch API client
//!
//! Items are submitted inline to `batchGenerateContent`. The returned
//! operation name is the handle; results come back as inlined responses,
//! which carry the `customId` metadata we attached when the provider
//! echoes it and otherwise line up with the submission order.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{
    BatchProvider, ProbeOutcome, ProviderRecord, connection_error, decode_image, decorate_prompt, ensure_success,
    read_json,
};
use crate::{
    error::{BatchError, Result},
    model::{BatchProviderKind, ImageModel},
    types::RoutedItem,
};

/// Default Generative Language API base URL
pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const BATCH_DISPLAY_NAME: &str = "image-generation-batch";

/// Batch states after which no further progress happens, sans prefix
const TERMINAL_STATES: &[&str] = &["SUCCEEDED", "FAILED", "CANCELLED", "EXPIRED", "PARTIALLY_SUCCEEDED"];

/// Gemini batch image generation client
pub(crate) struct GoogleBatchClient {
    name: String,
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl GoogleBatchClient {
    pub fn new(name: String, client: Client, api_key: SecretString, base_url: Option<Url>) -> Self {
        let base_url = base_url.as_ref().map_or(DEFAULT_BASE_URL, Url::as_str);

        Self {
            name,
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_operation(&self, handle: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, handle.trim_start_matches('/'));

        let response = self
            .client
            .get(url)
            .query(&[("key", self.api_key.expose_secret())])
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        read_json(&self.name, ensure_success(&self.name, response).await?).await
    }
}

// -- Wire types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGenerateRequest<'a> {
    batch: BatchDefinition<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchDefinition<'a> {
    display_name: &'static str,
    input_config: InputConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig<'a> {
    requests: InlinedRequests<'a>,
}

#[derive(Debug, Serialize)]
struct InlinedRequests<'a> {
    requests: Vec<InlinedRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct InlinedRequest<'a> {
    request: GenerateContentRequest,
    metadata: RequestMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: [Content; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: [TextPart; 1],
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: &'static str,
    image_size: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestMetadata<'a> {
    custom_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchOperation {
    name: String,
}

fn build_request(items: &[RoutedItem]) -> BatchGenerateRequest<'_> {
    let requests = items
        .iter()
        .map(|item| InlinedRequest {
            request: GenerateContentRequest {
                contents: [Content {
                    parts: [TextPart {
                        text: decorate_prompt(&item.input),
                    }],
                }],
                generation_config: GenerationConfig {
                    response_modalities: ["TEXT", "IMAGE"],
                    image_config: ImageConfig {
                        aspect_ratio: "1:1",
                        image_size: "1K",
                    },
                },
            },
            metadata: RequestMetadata {
                custom_id: &item.correlation_id,
            },
        })
        .collect();

    BatchGenerateRequest {
        batch: BatchDefinition {
            display_name: BATCH_DISPLAY_NAME,
            input_config: InputConfig {
                requests: InlinedRequests { requests },
            },
        },
    }
}

/// Batch state, wherever this API version put it
fn batch_state(operation: &Value) -> Option<&str> {
    operation
        .pointer("/metadata/state")
        .or_else(|| operation.get("state"))
        .and_then(Value::as_str)
}

fn is_terminal_state(state: &str) -> bool {
    let bare = state
        .strip_prefix("BATCH_STATE_")
        .or_else(|| state.strip_prefix("JOB_STATE_"))
        .unwrap_or(state);

    TERMINAL_STATES.contains(&bare)
}

fn classify_operation(operation: &Value) -> ProbeOutcome {
    let state = batch_state(operation);

    match state {
        Some(state) if is_terminal_state(state) => ProbeOutcome::Terminal {
            state: state.to_string(),
        },
        _ if operation.get("done").and_then(Value::as_bool) == Some(true) => ProbeOutcome::Terminal {
            state: state.unwrap_or("DONE").to_string(),
        },
        _ => ProbeOutcome::Pending,
    }
}

/// Inlined responses, wherever this API version put them
fn inlined_responses(operation: &Value) -> Option<&Vec<Value>> {
    [
        "/response/inlinedResponses/inlinedResponses",
        "/metadata/output/inlinedResponses/inlinedResponses",
        "/dest/inlinedResponses",
    ]
    .iter()
    .find_map(|pointer| operation.pointer(pointer).and_then(Value::as_array))
}

fn parse_results(operation: &Value, items: &[RoutedItem]) -> Result<Vec<ProviderRecord>> {
    let Some(responses) = inlined_responses(operation) else {
        let reason = operation
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map_or_else(|| "batch finished without inlined responses".to_string(), str::to_string);

        return Err(BatchError::InvalidResponse(reason));
    };

    let records = responses
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let correlation_id = entry
                .pointer("/metadata/customId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| items.get(index).map(|item| item.correlation_id.clone()));

            let Some(correlation_id) = correlation_id else {
                tracing::warn!(index, "dropping inlined response with no matching item");
                return None;
            };

            Some(parse_entry(correlation_id, entry))
        })
        .collect();

    Ok(records)
}

fn parse_entry(correlation_id: String, entry: &Value) -> ProviderRecord {
    if let Some(error) = entry.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);

        return ProviderRecord::error(correlation_id, message);
    }

    let Some(candidate) = entry
        .pointer("/response/candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    else {
        return ProviderRecord::error(correlation_id, "No candidates in response");
    };

    let image = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|part| part.pointer("/inlineData/data").and_then(Value::as_str));

    match image {
        Some(encoded) => match decode_image(encoded) {
            Ok(bytes) => ProviderRecord::image(correlation_id, bytes),
            Err(e) => ProviderRecord::error(correlation_id, e),
        },
        None => ProviderRecord::error(correlation_id, "No image found in response"),
    }
}

#[async_trait]
impl BatchProvider for GoogleBatchClient {
    fn kind(&self) -> BatchProviderKind {
        BatchProviderKind::Google
    }

    async fn submit(&self, items: &[RoutedItem]) -> Result<String> {
        let url = format!(
            "{}/models/{}:batchGenerateContent",
            self.base_url,
            ImageModel::Gemini3ProImagePreview.name()
        );

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&build_request(items))
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        let operation: BatchOperation = read_json(&self.name, ensure_success(&self.name, response).await?).await?;

        tracing::info!(
            provider = %self.name,
            batch = %operation.name,
            items = items.len(),
            "Gemini batch submitted"
        );

        Ok(operation.name)
    }

    async fn probe(&self, handle: &str) -> ProbeOutcome {
        match self.get_operation(handle).await {
            Ok(operation) => classify_operation(&operation),
            Err(e) => ProbeOutcome::Failed(e),
        }
    }

    async fn fetch_results(&self, handle: &str, items: &[RoutedItem]) -> Result<Vec<ProviderRecord>> {
        let operation = self.get_operation(handle).await?;
        let records = parse_results(&operation, items)?;

        tracing::debug!(
            provider = %self.name,
            batch = handle,
            expected = items.len(),
            received = records.len(),
            "Gemini batch results fetched"
        );

        Ok(records)
    }
}
