use std::path::PathBuf;

use serde::Deserialize;

/// Artifact storage backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Keep artifacts in process memory (lost on restart)
    Memory,
    /// Write artifacts below a directory on local disk
    Filesystem {
        /// Root directory; images land in `<path>/images/`
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("data"),
        }
    }
}
