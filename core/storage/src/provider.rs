//! Storage provider trait definition.

use async_trait::async_trait;

use lanvault_common::{Result, StoragePath};

/// Storage provider trait for different backends.
///
/// Objects are addressed by [`StoragePath`] relative to the provider root.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Store `data` at `path`, replacing any previous object.
    ///
    /// # Postconditions
    /// - Readers observe either the previous object or the complete new
    ///   one, never a partially written object
    /// - Missing parent directories are created
    ///
    /// # Errors
    /// - Network/I/O errors
    async fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<()>;

    /// Read the complete object at `path`.
    ///
    /// # Errors
    /// - `Error::NotFound` if nothing is stored there
    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>>;

    /// Check if an object exists. Never inspects its content.
    async fn exists(&self, path: &StoragePath) -> Result<bool>;

    /// Copy an object, replacing the destination if present.
    ///
    /// # Errors
    /// - `Error::NotFound` if the source does not exist
    async fn copy(&self, from: &StoragePath, to: &StoragePath) -> Result<()>;

    /// Remove the object at `path`.
    ///
    /// # Errors
    /// - `Error::NotFound` if nothing is stored there
    async fn delete(&self, path: &StoragePath) -> Result<()>;
}
