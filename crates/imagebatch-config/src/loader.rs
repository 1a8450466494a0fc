use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if the health path is not absolute, no provider is
    /// configured, or batch settings are out of range
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.health.enabled && !self.server.health.path.starts_with('/') {
            anyhow::bail!(
                "server.health.path must start with '/', got '{}'",
                self.server.health.path
            );
        }

        self.validate_providers()?;
        self.validate_batch_settings()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.imagegen.providers.is_empty() {
            anyhow::bail!("at least one image generation provider must be configured");
        }

        for (name, provider) in &self.imagegen.providers {
            if let Some(ref base_url) = provider.base_url
                && base_url.cannot_be_a_base()
            {
                anyhow::bail!("image generation provider '{name}' has an unusable base_url: {base_url}");
            }
        }

        Ok(())
    }

    fn validate_batch_settings(&self) -> anyhow::Result<()> {
        let batch = &self.imagegen.batch;

        if batch.probe_attempts == 0 {
            anyhow::bail!("imagegen.batch.probe_attempts must be at least 1");
        }

        if batch.max_probe_failures == 0 {
            anyhow::bail!("imagegen.batch.max_probe_failures must be at least 1");
        }

        if batch.sync_concurrency == 0 {
            anyhow::bail!("imagegen.batch.sync_concurrency must be at least 1");
        }

        batch.probe_backoff()?;
        batch.job_retention()?;

        Ok(())
    }
}
