//! Durable storage for generated images

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use imagebatch_config::StorageConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BatchError, Result};

/// Stable reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persists generated image bytes
///
/// Every call stores a new artifact under a fresh reference, so saving the
/// same bytes twice yields two valid references.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` and return the reference to hand back to callers
    async fn save(&self, bytes: Vec<u8>) -> Result<ArtifactRef>;
}

/// Build the artifact store selected in configuration
pub fn from_config(config: &StorageConfig) -> Arc<dyn ArtifactStore> {
    match config {
        StorageConfig::Memory => Arc::new(MemoryArtifactStore::default()),
        StorageConfig::Filesystem { path } => Arc::new(FilesystemArtifactStore::new(path.clone())),
    }
}

/// Writes images to `<root>/images/<ref>.jpg`
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// On-disk location for a reference
    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join("images").join(format!("{artifact}.jpg"))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn save(&self, bytes: Vec<u8>) -> Result<ArtifactRef> {
        let artifact = ArtifactRef::generate();
        let path = self.path_for(&artifact);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BatchError::Storage(format!("failed to create {}: {e}", parent.display())))?;
        }

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| BatchError::Storage(format!("failed to write {}: {e}", path.display())))?;

        tracing::debug!(artifact = %artifact, size = bytes.len(), "stored image");

        Ok(artifact)
    }
}

/// Keeps images in memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<ArtifactRef, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn get(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        self.artifacts.get(artifact).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(&self, bytes: Vec<u8>) -> Result<ArtifactRef> {
        let artifact = ArtifactRef::generate();
        self.artifacts.insert(artifact.clone(), bytes);
        Ok(artifact)
    }
}
