//! `OpenAI` Batch API client for GPT Image models
//!
//! Items are written as JSONL requests against `/v1/responses` with the
//! `image_generation` tool, uploaded as a batch input file, and submitted
//! as a single batch with a 24h completion window.

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    BatchProvider, ProbeOutcome, ProviderRecord, connection_error, decode_image, decorate_prompt, ensure_success,
    read_json,
};
use crate::{
    error::{BatchError, Result},
    model::BatchProviderKind,
    types::RoutedItem,
};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model that orchestrates the image generation tool call
const RESPONSES_MODEL: &str = "gpt-4.1-mini";

const PROMPT_PREFIX: &str = "Create a photorealistic image for the following context: ";

/// Batch statuses after which no further progress happens
const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "expired", "cancelled"];

/// `OpenAI` batch image generation client
pub(crate) struct OpenAiBatchClient {
    name: String,
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiBatchClient {
    pub fn new(name: String, client: Client, api_key: SecretString, base_url: Option<Url>) -> Self {
        let base_url = base_url.as_ref().map_or(DEFAULT_BASE_URL, Url::as_str);

        Self {
            name,
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn upload_input_file(&self, jsonl: String) -> Result<String> {
        let file = Part::bytes(jsonl.into_bytes())
            .file_name("image-batch.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| BatchError::InternalError(Some(format!("invalid upload part: {e}"))))?;

        let form = Form::new().text("purpose", "batch").part("file", file);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        let file: FileObject = read_json(&self.name, ensure_success(&self.name, response).await?).await?;

        Ok(file.id)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject> {
        let response = self
            .client
            .get(self.url(&format!("batches/{batch_id}")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        read_json(&self.name, ensure_success(&self.name, response).await?).await
    }

    async fn download_file(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/content")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        ensure_success(&self.name, response)
            .await?
            .text()
            .await
            .map_err(|e| connection_error(&self.name, &e))
    }
}

// -- Wire types --

/// One line of the batch input file
#[derive(Debug, Serialize)]
struct BatchLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ResponsesBody<'a>,
}

#[derive(Debug, Serialize)]
struct ResponsesBody<'a> {
    model: &'static str,
    input: String,
    tools: [ImageGenerationTool<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageGenerationTool<'a> {
    r#type: &'static str,
    model: &'a str,
    size: &'static str,
    quality: &'static str,
    output_format: &'static str,
    output_compression: u8,
}

#[derive(Debug, Serialize)]
struct CreateBatch<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
}

/// One line of the batch output file
#[derive(Debug, Deserialize)]
struct OutputLine {
    custom_id: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<OutputResponse>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    body: OutputBody,
}

impl OutputResponse {
    /// Failure reported by the provider for this one request
    fn failure(&self) -> Option<String> {
        if let Some(error) = &self.body.error {
            let message = error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            return Some(message);
        }

        self.status_code
            .filter(|code| !(200..300).contains(code))
            .map(|code| format!("HTTP {code}"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct OutputBody {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    r#type: String,
    #[serde(default)]
    result: Option<String>,
}

fn build_input_file(items: &[RoutedItem]) -> Result<String> {
    let lines = items
        .iter()
        .map(|item| {
            let line = BatchLine {
                custom_id: &item.correlation_id,
                method: "POST",
                url: "/v1/responses",
                body: ResponsesBody {
                    model: RESPONSES_MODEL,
                    input: decorate_prompt(&format!("{PROMPT_PREFIX}{}", item.input)),
                    tools: [ImageGenerationTool {
                        r#type: "image_generation",
                        model: item.model.name(),
                        size: "1024x1024",
                        quality: "high",
                        output_format: "jpeg",
                        output_compression: 75,
                    }],
                },
            };

            serde_json::to_string(&line)
                .map_err(|e| BatchError::InternalError(Some(format!("failed to encode batch line: {e}"))))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(lines.join("\n"))
}

fn classify_status(status: &str) -> ProbeOutcome {
    if TERMINAL_STATUSES.contains(&status) {
        ProbeOutcome::Terminal {
            state: status.to_string(),
        }
    } else {
        ProbeOutcome::Pending
    }
}

fn parse_output(content: &str) -> Vec<ProviderRecord> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<OutputLine>(line) {
            Ok(parsed) => Some(parse_line(parsed)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparseable batch output line");
                None
            }
        })
        .collect()
}

fn parse_line(line: OutputLine) -> ProviderRecord {
    if let Some(error) = line.error {
        return ProviderRecord::error(line.custom_id, error.to_string());
    }

    if let Some(message) = line.response.as_ref().and_then(OutputResponse::failure) {
        return ProviderRecord::error(line.custom_id, message);
    }

    let image = line
        .response
        .into_iter()
        .flat_map(|response| response.body.output)
        .find(|item| item.r#type == "image_generation_call")
        .and_then(|item| item.result);

    match image {
        Some(encoded) => match decode_image(&encoded) {
            Ok(bytes) => ProviderRecord::image(line.custom_id, bytes),
            Err(e) => ProviderRecord::error(line.custom_id, e),
        },
        None => ProviderRecord::error(line.custom_id, "No image found in response"),
    }
}

#[async_trait]
impl BatchProvider for OpenAiBatchClient {
    fn kind(&self) -> BatchProviderKind {
        BatchProviderKind::Openai
    }

    async fn submit(&self, items: &[RoutedItem]) -> Result<String> {
        let input_file_id = self.upload_input_file(build_input_file(items)?).await?;

        let response = self
            .client
            .post(self.url("batches"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&CreateBatch {
                input_file_id: &input_file_id,
                endpoint: "/v1/responses",
                completion_window: "24h",
            })
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        let batch: BatchObject = read_json(&self.name, ensure_success(&self.name, response).await?).await?;

        tracing::info!(
            provider = %self.name,
            batch_id = %batch.id,
            items = items.len(),
            "OpenAI batch submitted"
        );

        Ok(batch.id)
    }

    async fn probe(&self, handle: &str) -> ProbeOutcome {
        match self.retrieve_batch(handle).await {
            Ok(batch) => classify_status(&batch.status),
            Err(e) => ProbeOutcome::Failed(e),
        }
    }

    async fn fetch_results(&self, handle: &str, items: &[RoutedItem]) -> Result<Vec<ProviderRecord>> {
        let batch = self.retrieve_batch(handle).await?;

        let output_file_id = batch.output_file_id.ok_or_else(|| {
            BatchError::InvalidResponse(format!(
                "batch {handle} ended with status '{}' and has no output file",
                batch.status
            ))
        })?;

        let content = self.download_file(&output_file_id).await?;
        let records = parse_output(&content);

        tracing::debug!(
            provider = %self.name,
            batch_id = handle,
            expected = items.len(),
            received = records.len(),
            "OpenAI batch results downloaded"
        );

        Ok(records)
    }
}
