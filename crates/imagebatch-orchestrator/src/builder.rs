use std::sync::Arc;

use imagebatch_config::{Config, ImageGenProviderConfig, ImageGenProviderType};
use secrecy::SecretString;

use crate::{
    artifact,
    error::{BatchError, Result},
    http_client::http_client,
    model::BatchProviderKind,
    orchestrator::{BatchOrchestrator, PollPolicy},
    provider::{google::GoogleBatchClient, imagen::ImagenClient, openai::OpenAiBatchClient},
    store::MemoryJobStore,
};

/// Builder for constructing the batch orchestrator from configuration
pub struct BatchOrchestratorBuilder<'a> {
    config: &'a Config,
}

impl<'a> BatchOrchestratorBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn build(self) -> Result<BatchOrchestrator> {
        let policy =
            PollPolicy::from_settings(&self.config.imagegen.batch).map_err(|e| BatchError::ConfigError(e.to_string()))?;

        let mut orchestrator = BatchOrchestrator::new(
            Arc::new(MemoryJobStore::default()),
            artifact::from_config(&self.config.storage),
            policy,
        );

        for (name, provider_config) in &self.config.imagegen.providers {
            tracing::debug!("Initializing image generation provider: {name}");

            let api_key = resolve_api_key(name, provider_config)?;
            let base_url = provider_config.base_url.clone();

            orchestrator = match provider_config.provider_type {
                ImageGenProviderType::Openai => {
                    ensure_unique(&orchestrator, BatchProviderKind::Openai, name)?;

                    orchestrator.with_batch_provider(Arc::new(OpenAiBatchClient::new(
                        name.clone(),
                        http_client(),
                        api_key,
                        base_url,
                    )))
                }
                ImageGenProviderType::Google => {
                    ensure_unique(&orchestrator, BatchProviderKind::Google, name)?;

                    // One Google key serves both Gemini batches and Imagen
                    orchestrator
                        .with_batch_provider(Arc::new(GoogleBatchClient::new(
                            name.clone(),
                            http_client(),
                            api_key.clone(),
                            base_url.clone(),
                        )))
                        .with_generator(Arc::new(ImagenClient::new(
                            name.clone(),
                            http_client(),
                            api_key,
                            base_url,
                        )))
                }
            };
        }

        tracing::debug!(
            "Batch orchestrator initialized with {} provider(s)",
            self.config.imagegen.providers.len()
        );

        Ok(orchestrator)
    }
}

fn ensure_unique(orchestrator: &BatchOrchestrator, kind: BatchProviderKind, name: &str) -> Result<()> {
    if orchestrator.has_batch_provider(kind) {
        return Err(BatchError::ConfigError(format!(
            "image generation provider '{name}' duplicates an earlier '{}' provider",
            kind.as_str()
        )));
    }

    Ok(())
}

fn resolve_api_key(name: &str, config: &ImageGenProviderConfig) -> Result<SecretString> {
    config.api_key.clone().ok_or_else(|| {
        BatchError::ConfigError(format!("API key required for image generation provider '{name}'"))
    })
}
