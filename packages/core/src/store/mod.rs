//! BlobStore Trait - Local Persistence Abstraction
//!
//! A session keeps exactly one document: its encoded family graph under
//! [`FAMILY_DATA_KEY`]. The trait abstracts where that document lives so the
//! session logic runs unchanged against memory (tests) or the file system.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kintree_core::store::{load_graph, save_graph, BlobStore, FileBlobStore};
//! use kintree_core::models::FamilyGraph;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new("./data"));
//!     save_graph(store.as_ref(), &FamilyGraph::new()).await?;
//!     let restored = load_graph(store.as_ref()).await?;
//!     assert!(restored.is_none() || restored.unwrap().is_empty());
//!     Ok(())
//! }
//! ```

use crate::codec;
use crate::error::{FamilyError, Result};
use crate::models::FamilyGraph;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Key of the persisted family graph
pub const FAMILY_DATA_KEY: &str = "familyData";

/// Key/value blob persistence
///
/// Implementations must be `Send + Sync`; sessions hold them as
/// `Arc<dyn BlobStore>` across await points.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob, `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or replace) a blob
    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Delete a blob; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| FamilyError::storage(format!("Failed to acquire lock: {}", e)))?;
        Ok(blobs.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| FamilyError::storage(format!("Failed to acquire lock: {}", e)))?;
        blobs.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| FamilyError::storage(format!("Failed to acquire lock: {}", e)))?;
        blobs.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per blob inside a directory
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(FamilyError::storage(format!("Invalid blob key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|e| FamilyError::storage(format!("Failed to read {}: {}", key, e)))?;
        Ok(Some(contents))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FamilyError::storage(format!("Failed to create store directory: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&temp, value)
            .await
            .map_err(|e| FamilyError::storage(format!("Failed to write {}: {}", key, e)))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| FamilyError::storage(format!("Failed to finalize {}: {}", key, e)))?;

        debug!("Stored blob {} at {}", key, path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FamilyError::storage(format!(
                "Failed to remove {}: {}",
                key, e
            ))),
        }
    }
}

/// Persist a graph under [`FAMILY_DATA_KEY`]
pub async fn save_graph(store: &dyn BlobStore, graph: &FamilyGraph) -> Result<()> {
    let json = codec::to_json(graph)?;
    store.put(FAMILY_DATA_KEY, json).await
}

/// Load the graph stored under [`FAMILY_DATA_KEY`], if any
pub async fn load_graph(store: &dyn BlobStore) -> Result<Option<FamilyGraph>> {
    match store.get(FAMILY_DATA_KEY).await? {
        Some(json) => Ok(Some(codec::from_json(&json)?)),
        None => Ok(None),
    }
}

/// Forget the stored graph
pub async fn clear_graph(store: &dyn BlobStore) -> Result<()> {
    store.remove(FAMILY_DATA_KEY).await
}
