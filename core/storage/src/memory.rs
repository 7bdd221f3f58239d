//! In-memory storage provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::provider::StorageProvider;
use lanvault_common::{Error, Result, StoragePath};

/// In-memory storage provider.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same backing map, which lets a
/// test simulate a restart by building a new component over a clone.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn path_to_key(path: &StoragePath) -> String {
        path.to_string_path()
    }

    fn poisoned() -> Error {
        Error::Storage("Memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Storage root is not an object".to_string(),
            ));
        }
        self.storage
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(Self::path_to_key(path), data);
        Ok(())
    }

    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        self.storage
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&Self::path_to_key(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool> {
        Ok(self
            .storage
            .read()
            .map_err(|_| Self::poisoned())?
            .contains_key(&Self::path_to_key(path)))
    }

    async fn copy(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
        let data = self.download(from).await?;
        self.upload(to, data).await
    }

    async fn delete(&self, path: &StoragePath) -> Result<()> {
        self.storage
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(&Self::path_to_key(path))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", path)))
    }
}
