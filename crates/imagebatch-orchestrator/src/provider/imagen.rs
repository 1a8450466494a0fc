//! Imagen `predict` client for models without batch support

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ImageGenerator, connection_error, decode_image, decorate_prompt, ensure_success, google, read_json};
use crate::{
    error::{BatchError, Result},
    types::RoutedItem,
};

/// Synchronous Imagen client, one image per call
pub(crate) struct ImagenClient {
    name: String,
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl ImagenClient {
    pub fn new(name: String, client: Client, api_key: SecretString, base_url: Option<Url>) -> Self {
        let base_url = base_url.as_ref().map_or(google::DEFAULT_BASE_URL, Url::as_str);

        Self {
            name,
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: [Instance; 1],
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

fn build_request(item: &RoutedItem) -> PredictRequest {
    PredictRequest {
        instances: [Instance {
            prompt: decorate_prompt(&item.input),
        }],
        parameters: Parameters {
            sample_count: 1,
            aspect_ratio: "1:1",
        },
    }
}

fn extract_image(response: PredictResponse) -> Result<Vec<u8>> {
    let encoded = response
        .predictions
        .into_iter()
        .next()
        .and_then(|p| p.bytes_base64_encoded)
        .ok_or_else(|| BatchError::InvalidResponse("No image found in response".to_string()))?;

    decode_image(&encoded).map_err(BatchError::InvalidResponse)
}

#[async_trait]
impl ImageGenerator for ImagenClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, item: &RoutedItem) -> Result<Vec<u8>> {
        let url = format!("{}/models/{}:predict", self.base_url, item.model.name());

        tracing::debug!(
            provider = %self.name,
            correlation_id = %item.correlation_id,
            "generating image via Imagen"
        );

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&build_request(item))
            .send()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        let body: PredictResponse = read_json(&self.name, ensure_success(&self.name, response).await?).await?;

        extract_image(body)
    }
}
