//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::PathBuf;

use imagebatch_config::{
    BatchSettings, Config, HealthConfig, ImageGenConfig, ImageGenProviderConfig, ImageGenProviderType, ServerConfig,
    StorageConfig,
};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults and in-memory storage
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig::default(),
                },
                imagegen: ImageGenConfig {
                    batch: BatchSettings {
                        probe_backoff: "1ms".to_owned(),
                        ..BatchSettings::default()
                    },
                    ..ImageGenConfig::default()
                },
                storage: StorageConfig::Memory,
                telemetry: None,
            },
        }
    }

    fn with_provider(mut self, name: &str, provider_type: ImageGenProviderType, base_url: &str) -> Self {
        self.config.imagegen.providers.insert(
            name.to_owned(),
            ImageGenProviderConfig {
                provider_type,
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
            },
        );
        self
    }

    /// Add an `OpenAI` batch provider pointed at a mock backend
    pub fn with_openai_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ImageGenProviderType::Openai, base_url)
    }

    /// Add a Google (Gemini batch and Imagen) provider pointed at a mock backend
    pub fn with_google_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ImageGenProviderType::Google, base_url)
    }

    pub fn with_batch_settings(mut self, settings: BatchSettings) -> Self {
        self.config.imagegen.batch = settings;
        self
    }

    /// Persist artifacts under `path` instead of in memory
    pub fn with_filesystem_storage(mut self, path: PathBuf) -> Self {
        self.config.storage = StorageConfig::Filesystem { path };
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
