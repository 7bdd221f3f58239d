//! Whole-document vault persistence.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::VaultDocument;
use lanvault_common::{Error, Result, StoragePath};
use lanvault_storage::StorageProvider;

/// File name of the vault document inside a data directory.
pub const VAULT_FILENAME: &str = "vault.json";

/// Reads and writes a single vault document through a storage provider.
///
/// Writers are serialized: `update` holds the lock across its
/// read-modify-write, and `save` takes the same lock, so two concurrent
/// mutations never interleave.
pub struct VaultStore {
    provider: Arc<dyn StorageProvider>,
    path: StoragePath,
    write_lock: Mutex<()>,
}

impl VaultStore {
    /// Create a store for the document at `path`.
    pub fn new(provider: Arc<dyn StorageProvider>, path: StoragePath) -> Self {
        Self {
            provider,
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store for `vault.json` at the provider's root.
    pub fn at_root(provider: Arc<dyn StorageProvider>) -> Result<Self> {
        let path = StoragePath::root().join(VAULT_FILENAME)?;
        Ok(Self::new(provider, path))
    }

    /// Location of the document.
    pub fn path(&self) -> &StoragePath {
        &self.path
    }

    /// Whether a document has been written.
    pub async fn exists(&self) -> Result<bool> {
        self.provider.exists(&self.path).await
    }

    /// Load and validate the document.
    ///
    /// # Errors
    /// - `Error::VaultNotFound` if no document exists
    pub async fn load(&self) -> Result<VaultDocument> {
        match self.load_optional().await? {
            Some(doc) => Ok(doc),
            None => Err(Error::VaultNotFound(self.path.to_string())),
        }
    }

    /// Load the document, or `None` if none has been written.
    pub async fn load_optional(&self) -> Result<Option<VaultDocument>> {
        match self.provider.download(&self.path).await {
            Ok(bytes) => VaultDocument::from_bytes(&bytes).map(Some),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the stored document.
    pub async fn save(&self, doc: &VaultDocument) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(doc).await
    }

    /// Load, mutate and save under the write lock.
    ///
    /// The closure returns `Some(value)` to commit its changes and `None` to
    /// leave the stored document untouched.
    ///
    /// # Errors
    /// - `Error::VaultNotFound` if no document exists
    pub async fn update<T, F>(&self, mutate: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut VaultDocument) -> Result<Option<T>>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;

        let outcome = mutate(&mut doc)?;
        if outcome.is_some() {
            doc.validate()?;
            self.write(&doc).await?;
        }
        Ok(outcome)
    }

    async fn write(&self, doc: &VaultDocument) -> Result<()> {
        let bytes = doc.to_bytes()?;
        debug!(path = %self.path, entries = doc.entries.len(), "Saving vault");
        self.provider.upload(&self.path, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanvault_crypto::{CheckHash, Salt};
    use lanvault_storage::MemoryProvider;

    fn empty_document() -> VaultDocument {
        VaultDocument::new(Salt::from_bytes([1u8; 32]), CheckHash::from_bytes([2u8; 32]))
    }

    #[tokio::test]
    async fn test_missing_vault() {
        let store = VaultStore::at_root(Arc::new(MemoryProvider::new())).unwrap();
        assert!(!store.exists().await.unwrap());
        assert!(matches!(store.load().await, Err(Error::VaultNotFound(_))));
        assert!(store.load_optional().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload_through_new_store() {
        let provider = MemoryProvider::new();
        let store = VaultStore::at_root(Arc::new(provider.clone())).unwrap();
        store.save(&empty_document()).await.unwrap();

        let reopened = VaultStore::at_root(Arc::new(provider)).unwrap();
        let doc = reopened.load().await.unwrap();
        assert_eq!(doc.metadata.salt, Salt::from_bytes([1u8; 32]));
    }

    #[tokio::test]
    async fn test_update_none_does_not_write() {
        let provider = MemoryProvider::new();
        let store = VaultStore::at_root(Arc::new(provider.clone())).unwrap();
        store.save(&empty_document()).await.unwrap();
        let before = provider.download(store.path()).await.unwrap();

        let out: Option<()> = store
            .update(|doc| {
                doc.entries.clear();
                Ok(None)
            })
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(provider.download(store.path()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        use lanvault_common::EntryId;
        use crate::document::{Validity, VaultEntry};

        let store = Arc::new(VaultStore::at_root(Arc::new(MemoryProvider::new())).unwrap());
        store.save(&empty_document()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(|doc| {
                        doc.entries.push(VaultEntry {
                            id: EntryId::generate(),
                            title: format!("entry-{}", i),
                            username: String::new(),
                            password: String::new(),
                            iv: String::new(),
                            auth_tag: String::new(),
                            created_at: None,
                            validity: Validity::Infinite,
                        });
                        Ok(Some(()))
                    })
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.load().await.unwrap().entries.len(), 16);
    }
}
