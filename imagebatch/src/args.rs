use std::path::PathBuf;

use clap::Parser;

/// Batch image generation service
#[derive(Debug, Parser)]
#[command(
    name = "imagebatch",
    about = "Fans image requests out to provider batch APIs and collects the results"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "imagebatch.toml", env = "IMAGEBATCH_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "IMAGEBATCH_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    pub log: String,
}
