#![allow(clippy::must_use_candidate)]

mod env;
pub mod health;
pub mod imagegen;
mod loader;
pub mod server;
pub mod storage;
pub mod telemetry;

use serde::Deserialize;

pub use health::*;
pub use imagegen::*;
pub use server::*;
pub use storage::*;
pub use telemetry::{ExportProtocol, ExporterConfig, TelemetryConfig};

/// Top-level image batch service configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Image generation providers and batch orchestration settings
    #[serde(default)]
    pub imagegen: ImageGenConfig,
    /// Where generated artifacts are persisted
    #[serde(default)]
    pub storage: StorageConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
