//! Local filesystem storage provider.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::provider::StorageProvider;
use lanvault_common::{Error, Result, StoragePath};

/// Local filesystem storage provider.
///
/// Writes go to a temporary sibling file which is flushed to disk and then
/// renamed over the target, so a crash mid-write leaves the previous
/// object in place.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory of this provider.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a StoragePath to a filesystem path.
    fn to_fs_path(&self, path: &StoragePath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    fn require_object(path: &StoragePath) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Storage root is not an object".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<()> {
        Self::require_object(path)?;
        let fs_path = self.to_fs_path(path);

        let parent = fs_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).await?;

        let name = path.name().unwrap_or("object");
        let tmp_path = parent.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));

        let write_result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &fs_path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(e));
        }

        debug!(path = %path, size = data.len(), "Object written");
        Ok(())
    }

    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        Self::require_object(path)?;
        let fs_path = self.to_fs_path(path);

        if !fs_path.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", path)));
        }

        Ok(fs::read(&fs_path).await?)
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool> {
        let fs_path = self.to_fs_path(path);
        Ok(fs::try_exists(&fs_path).await?)
    }

    async fn copy(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
        // Read and re-upload so the destination gets the same atomic
        // replacement as any other write.
        let data = self.download(from).await?;
        self.upload(to, data).await
    }

    async fn delete(&self, path: &StoragePath) -> Result<()> {
        Self::require_object(path)?;
        let fs_path = self.to_fs_path(path);

        if !fs_path.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", path)));
        }

        fs::remove_file(&fs_path).await?;
        debug!(path = %path, "Object removed");
        Ok(())
    }
}
