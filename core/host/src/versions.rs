//! Rotating snapshot history for the host's vault.
//!
//! Three slots are kept: `vault.json` (current), `vault.v1.json`
//! (previous) and `vault.v2.json` (oldest). A global counter in
//! `version-counter.json` numbers every accepted push and is never reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use lanvault_common::{Error, Result, StoragePath};
use lanvault_storage::StorageProvider;
use lanvault_sync::protocol::{SLOT_LABELS, UNKNOWN_VERSION};
use lanvault_sync::VersionInfo;
use lanvault_vault::{SyncMetadata, VaultDocument};

/// Slot file names, indexed by slot number.
pub const SLOT_FILES: [&str; 3] = ["vault.json", "vault.v1.json", "vault.v2.json"];

/// Counter file name.
pub const COUNTER_FILE: &str = "version-counter.json";

#[derive(Debug, Serialize, Deserialize)]
struct CounterFile {
    counter: u64,
}

/// Only the part of a slot needed for listings.
#[derive(Debug, Deserialize)]
struct SlotHeader {
    #[serde(rename = "syncMetadata", default)]
    sync_metadata: Option<SyncMetadata>,
}

/// Version code and time of the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStatus {
    pub version_code: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Owns the slot files and the version counter.
pub struct VersionManager {
    provider: Arc<dyn StorageProvider>,
    slots: [StoragePath; 3],
    counter_path: StoragePath,
    push_lock: Mutex<()>,
}

impl VersionManager {
    /// Open the history in `provider`, creating the counter at 0 if absent.
    pub async fn open(provider: Arc<dyn StorageProvider>) -> Result<Self> {
        let root = StoragePath::root();
        let slots = [
            root.join(SLOT_FILES[0])?,
            root.join(SLOT_FILES[1])?,
            root.join(SLOT_FILES[2])?,
        ];
        let counter_path = root.join(COUNTER_FILE)?;

        let manager = Self {
            provider,
            slots,
            counter_path,
            push_lock: Mutex::new(()),
        };
        if !manager.provider.exists(&manager.counter_path).await? {
            manager.write_counter(0).await?;
        }
        debug!(provider = manager.provider.name(), "Version history ready");
        Ok(manager)
    }

    /// Last assigned version number (0 before the first push).
    pub async fn counter(&self) -> Result<u64> {
        match self.provider.download(&self.counter_path).await {
            Ok(bytes) => Ok(serde_json::from_slice::<CounterFile>(&bytes)?.counter),
            Err(Error::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Whether a current document exists.
    pub async fn exists(&self) -> Result<bool> {
        self.provider.exists(&self.slots[0]).await
    }

    /// The current document, if any push has happened.
    pub async fn current(&self) -> Result<Option<VaultDocument>> {
        self.read_slot(0).await
    }

    /// A retained document by slot index.
    ///
    /// # Errors
    /// - `Error::VersionNotFound` if the index is past the oldest slot or
    ///   the slot is empty
    pub async fn by_index(&self, index: usize) -> Result<VaultDocument> {
        if index >= SLOT_FILES.len() {
            return Err(Error::VersionNotFound(index));
        }
        self.read_slot(index)
            .await?
            .ok_or(Error::VersionNotFound(index))
    }

    /// Version code and timestamp of the current document.
    pub async fn status(&self) -> Result<Option<VersionStatus>> {
        Ok(self.read_header(0).await?.map(|meta| VersionStatus {
            version_code: meta
                .as_ref()
                .map(|m| m.version_code.clone())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            timestamp: meta.map(|m| m.timestamp),
        }))
    }

    /// One entry per occupied slot, current first.
    pub async fn list_versions(&self) -> Result<Vec<VersionInfo>> {
        let mut versions = Vec::with_capacity(SLOT_FILES.len());
        for index in 0..SLOT_FILES.len() {
            let Some(meta) = self.read_header(index).await? else {
                continue;
            };
            versions.push(VersionInfo {
                index,
                label: SLOT_LABELS[index].to_string(),
                version_code: meta
                    .as_ref()
                    .map(|m| m.version_code.clone())
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
                timestamp: meta.as_ref().map(|m| m.timestamp),
                hash: meta.map(|m| m.hash),
            });
        }
        Ok(versions)
    }

    /// Accept a new document, shifting history down one slot.
    ///
    /// The rotation, counter increment and slot writes run as one critical
    /// section. The new document is serialized before anything is touched.
    /// The counter is persisted before the slots are written, so a failed
    /// write skips a number but never reuses one. If any slot write fails,
    /// the slots already rewritten are restored from their prior contents.
    ///
    /// Returns the version code assigned to the document.
    pub async fn push(&self, mut doc: VaultDocument) -> Result<String> {
        let _guard = self.push_lock.lock().await;

        let counter = self.counter().await? + 1;
        let metadata = SyncMetadata {
            version_code: SyncMetadata::version_code_for(counter),
            timestamp: Utc::now(),
            hash: doc.content_hash()?,
        };
        let version_code = metadata.version_code.clone();
        doc.sync_metadata = Some(metadata);
        let bytes = doc.to_bytes()?;

        let before = [
            self.read_raw(0).await?,
            self.read_raw(1).await?,
            self.read_raw(2).await?,
        ];
        self.write_counter(counter).await?;

        let after = [Some(bytes), before[0].clone(), before[1].clone()];
        let mut written = Vec::with_capacity(SLOT_FILES.len());
        for index in (0..SLOT_FILES.len()).rev() {
            let Some(data) = after[index].clone() else {
                continue;
            };
            if let Err(e) = self.provider.upload(&self.slots[index], data).await {
                warn!(version = %version_code, error = %e, "Slot write failed, restoring history");
                self.restore(&written, &before).await;
                return Err(e);
            }
            written.push(index);
        }

        info!(version = %version_code, entries = doc.entries.len(), "Vault version stored");
        Ok(version_code)
    }

    /// Put the given slots back to their contents before a failed push.
    async fn restore(&self, written: &[usize], before: &[Option<Vec<u8>>; 3]) {
        for &index in written {
            let outcome = match &before[index] {
                Some(data) => self.provider.upload(&self.slots[index], data.clone()).await,
                None => self.provider.delete(&self.slots[index]).await,
            };
            if let Err(e) = outcome {
                error!(slot = SLOT_FILES[index], error = %e, "Failed to restore slot");
            }
        }
    }

    async fn read_raw(&self, index: usize) -> Result<Option<Vec<u8>>> {
        match self.provider.download(&self.slots[index]).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_slot(&self, index: usize) -> Result<Option<VaultDocument>> {
        match self.read_raw(index).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `None` for an empty slot; `Some(None)` for a slot without metadata.
    async fn read_header(&self, index: usize) -> Result<Option<Option<SyncMetadata>>> {
        match self.read_raw(index).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice::<SlotHeader>(&bytes)?.sync_metadata)),
            None => Ok(None),
        }
    }

    async fn write_counter(&self, counter: u64) -> Result<()> {
        debug!(counter, "Persisting version counter");
        let bytes = serde_json::to_vec(&CounterFile { counter })?;
        self.provider.upload(&self.counter_path, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lanvault_common::EntryId;
    use lanvault_crypto::{CheckHash, Salt};
    use lanvault_storage::{LocalProvider, MemoryProvider};
    use lanvault_vault::{Validity, VaultEntry};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory storage whose writes to one object can be made to fail.
    struct FlakyProvider {
        inner: MemoryProvider,
        target: StoragePath,
        failing: AtomicBool,
    }

    impl FlakyProvider {
        fn new(target: &str) -> Self {
            Self {
                inner: MemoryProvider::new(),
                target: StoragePath::root().join(target).unwrap(),
                failing: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) && *path == self.target {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.upload(path, data).await
        }

        async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
            self.inner.download(path).await
        }

        async fn exists(&self, path: &StoragePath) -> Result<bool> {
            self.inner.exists(path).await
        }

        async fn copy(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
            let data = self.download(from).await?;
            self.upload(to, data).await
        }

        async fn delete(&self, path: &StoragePath) -> Result<()> {
            self.inner.delete(path).await
        }
    }

    async fn version_codes(manager: &VersionManager) -> Vec<String> {
        manager
            .list_versions()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version_code)
            .collect()
    }

    fn doc_with_titles(titles: &[&str]) -> VaultDocument {
        let mut doc = VaultDocument::new(Salt::from_bytes([4u8; 32]), CheckHash::from_bytes([5u8; 32]));
        for title in titles {
            doc.entries.push(VaultEntry {
                id: EntryId::generate(),
                title: title.to_string(),
                username: String::new(),
                password: "aa".to_string(),
                iv: "00".repeat(12),
                auth_tag: "00".repeat(16),
                created_at: None,
                validity: Validity::Infinite,
            });
        }
        doc
    }

    async fn manager_over(provider: &MemoryProvider) -> VersionManager {
        VersionManager::open(Arc::new(provider.clone())).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_history() {
        let manager = manager_over(&MemoryProvider::new()).await;
        assert_eq!(manager.counter().await.unwrap(), 0);
        assert!(!manager.exists().await.unwrap());
        assert!(manager.current().await.unwrap().is_none());
        assert!(manager.status().await.unwrap().is_none());
        assert!(manager.list_versions().await.unwrap().is_empty());
        assert!(matches!(manager.by_index(0).await, Err(Error::VersionNotFound(0))));
    }

    #[tokio::test]
    async fn test_push_tags_document() {
        let manager = manager_over(&MemoryProvider::new()).await;
        let doc = doc_with_titles(&["a"]);
        let expected_hash = doc.content_hash().unwrap();

        assert_eq!(manager.push(doc).await.unwrap(), "v1");

        let current = manager.current().await.unwrap().unwrap();
        let meta = current.sync_metadata.unwrap();
        assert_eq!(meta.version_code, "v1");
        assert_eq!(meta.hash, expected_hash);
    }

    #[tokio::test]
    async fn test_keeps_only_three_generations() {
        let manager = manager_over(&MemoryProvider::new()).await;
        for n in 1..=5 {
            let title = format!("push-{}", n);
            manager.push(doc_with_titles(&[&title])).await.unwrap();
        }

        let versions = manager.list_versions().await.unwrap();
        let summary: Vec<_> = versions
            .iter()
            .map(|v| (v.index, v.label.as_str(), v.version_code.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(0, "current", "v5"), (1, "previous", "v4"), (2, "oldest", "v3")]
        );

        for (index, title) in [(0, "push-5"), (1, "push-4"), (2, "push-3")] {
            assert_eq!(manager.by_index(index).await.unwrap().entries[0].title, title);
        }
        assert!(matches!(manager.by_index(3).await, Err(Error::VersionNotFound(3))));
    }

    #[tokio::test]
    async fn test_counter_survives_restart() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let provider = Arc::new(LocalProvider::new(temp.path()).unwrap());
            let manager = VersionManager::open(provider).await.unwrap();
            manager.push(doc_with_titles(&["a"])).await.unwrap();
            manager.push(doc_with_titles(&["b"])).await.unwrap();
        }

        let provider = Arc::new(LocalProvider::new(temp.path()).unwrap());
        let manager = VersionManager::open(provider).await.unwrap();
        assert_eq!(manager.counter().await.unwrap(), 2);
        assert_eq!(manager.push(doc_with_titles(&["c"])).await.unwrap(), "v3");

        let counter: serde_json::Value =
            serde_json::from_slice(&std::fs::read(temp.path().join(COUNTER_FILE)).unwrap())
                .unwrap();
        assert_eq!(counter, serde_json::json!({"counter": 3}));
    }

    #[tokio::test]
    async fn test_version_codes_strictly_increase_under_concurrency() {
        let manager = Arc::new(manager_over(&MemoryProvider::new()).await);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.push(doc_with_titles(&["x"])).await.unwrap()
            }));
        }

        let mut numbers = Vec::new();
        for task in tasks {
            let code = task.await.unwrap();
            numbers.push(code.trim_start_matches('v').parse::<u64>().unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());

        let versions = manager.list_versions().await.unwrap();
        assert_eq!(versions[0].version_code, "v8");
        assert_eq!(versions[1].version_code, "v7");
        assert_eq!(versions[2].version_code, "v6");
    }

    #[tokio::test]
    async fn test_status_of_current() {
        let manager = manager_over(&MemoryProvider::new()).await;
        manager.push(doc_with_titles(&[])).await.unwrap();
        let status = manager.status().await.unwrap().unwrap();
        assert_eq!(status.version_code, "v1");
        assert!(status.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_history() {
        let provider = Arc::new(FlakyProvider::new(SLOT_FILES[0]));
        let manager = VersionManager::open(provider.clone()).await.unwrap();
        for title in ["one", "two", "three"] {
            manager.push(doc_with_titles(&[title])).await.unwrap();
        }
        assert_eq!(version_codes(&manager).await, ["v3", "v2", "v1"]);

        provider.set_failing(true);
        assert!(matches!(
            manager.push(doc_with_titles(&["four"])).await,
            Err(Error::Storage(_))
        ));
        assert_eq!(version_codes(&manager).await, ["v3", "v2", "v1"]);
        for (index, title) in [(0, "three"), (1, "two"), (2, "one")] {
            assert_eq!(manager.by_index(index).await.unwrap().entries[0].title, title);
        }

        provider.set_failing(false);
        assert_eq!(manager.push(doc_with_titles(&["five"])).await.unwrap(), "v5");
        assert_eq!(version_codes(&manager).await, ["v5", "v3", "v2"]);
    }

    #[tokio::test]
    async fn test_failed_write_empties_new_slots() {
        let provider = Arc::new(FlakyProvider::new(SLOT_FILES[0]));
        let manager = VersionManager::open(provider.clone()).await.unwrap();
        manager.push(doc_with_titles(&["one"])).await.unwrap();

        provider.set_failing(true);
        assert!(manager.push(doc_with_titles(&["two"])).await.is_err());

        assert_eq!(version_codes(&manager).await, ["v1"]);
        assert!(matches!(manager.by_index(1).await, Err(Error::VersionNotFound(1))));
    }
}
