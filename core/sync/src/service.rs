//! Device-side sync operations.
//!
//! Wraps the client with the device's vault store and keystore, and
//! reports every call as a uniform [`SyncOutcome`].

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::SyncClient;
use crate::config::{SyncClientConfig, SyncConfig};
use crate::discovery::{discover, HostInfo, ServiceBrowser};
use crate::protocol::{HealthResponse, SyncOutcome, VersionInfo};
use lanvault_common::{Error, Result};
use lanvault_crypto::verify_check_hash;
use lanvault_vault::keystore::{ACCOUNT_MASTER_KEY, ACCOUNT_SYNC_HOST_URL, ACCOUNT_SYNC_TOKEN};
use lanvault_vault::{KeyStore, VaultSession, VaultStore};

const LOCKED_MESSAGE: &str = "Vault must be unlocked first";
const NO_VAULT_MESSAGE: &str = "No vault found";
const NO_CONFIG_MESSAGE: &str = "No sync config found";

#[derive(Debug, Clone, Serialize)]
pub struct Acknowledged {}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredHost {
    pub host: Option<HostInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub data: HealthResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub version_code: String,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pulled {
    pub version_code: String,
    pub entries: usize,
    /// The pulled vault uses another password; the session was locked.
    pub unlock_required: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pushed {
    pub version_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Versions {
    pub versions: Vec<VersionInfo>,
}

/// Sync operations for one device vault.
pub struct SyncService {
    client: SyncClient,
    store: Arc<VaultStore>,
    keystore: Option<Arc<dyn KeyStore>>,
    settings: SyncClientConfig,
}

impl SyncService {
    pub fn new(
        settings: SyncClientConfig,
        store: Arc<VaultStore>,
        keystore: Option<Arc<dyn KeyStore>>,
    ) -> Result<Self> {
        Ok(Self {
            client: SyncClient::new(&settings)?,
            store,
            keystore,
            settings,
        })
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    /// Restore host URL and token from the keystore into the client.
    pub fn load_config(&self) -> SyncOutcome<SyncConfig> {
        self.try_load_config().into()
    }

    fn try_load_config(&self) -> Result<SyncConfig> {
        let keystore = self.require_keystore()?;
        let url = keystore.get(ACCOUNT_SYNC_HOST_URL)?;
        let token = keystore.get(ACCOUNT_SYNC_TOKEN)?;
        match (url, token) {
            (Some(url), Some(token)) => {
                self.client.set_config(&url, &token)?;
                Ok(self.client.config())
            }
            _ => Err(Error::NotConfigured(NO_CONFIG_MESSAGE.to_string())),
        }
    }

    /// Point the client at a host and persist the settings.
    pub fn save_config(&self, host_url: &str, auth_token: &str) -> SyncOutcome<Acknowledged> {
        self.try_save_config(host_url, auth_token).into()
    }

    fn try_save_config(&self, host_url: &str, auth_token: &str) -> Result<Acknowledged> {
        self.client.set_config(host_url, auth_token)?;
        let config = self.client.config();
        if let Some(keystore) = &self.keystore {
            if let (Some(url), Some(token)) = (&config.host_url, &config.auth_token) {
                keystore.set(ACCOUNT_SYNC_TOKEN, token)?;
                keystore.set(ACCOUNT_SYNC_HOST_URL, url)?;
            }
        } else {
            warn!("No keystore configured, sync settings will not persist");
        }
        info!(url = ?config.host_url, "Sync config saved");
        Ok(Acknowledged {})
    }

    /// Look for a host on the local network.
    pub async fn discover(&self, browser: &dyn ServiceBrowser) -> SyncOutcome<DiscoveredHost> {
        discover(browser, self.settings.discovery_timeout)
            .await
            .map(|host| DiscoveredHost { host })
            .into()
    }

    pub async fn test_connection(&self) -> SyncOutcome<HealthCheck> {
        self.client
            .test_connection()
            .await
            .map(|data| HealthCheck { data })
            .into()
    }

    pub async fn status(&self) -> SyncOutcome<HostStatus> {
        self.client
            .get_status()
            .await
            .map(|s| HostStatus {
                version_code: s.version_code,
                timestamp: s.timestamp,
            })
            .into()
    }

    pub async fn list_versions(&self) -> SyncOutcome<Versions> {
        self.client
            .list_versions()
            .await
            .map(|versions| Versions { versions })
            .into()
    }

    /// Replace the local vault with the host's current one.
    ///
    /// The fetched document is validated before anything is written, and
    /// then saved as a whole. If the session key does not open the pulled
    /// vault, the session is locked and any remembered key forgotten, so
    /// nothing is sealed under a key the vault no longer accepts.
    pub async fn pull(&self, session: &mut VaultSession) -> SyncOutcome<Pulled> {
        if !session.is_unlocked() {
            return SyncOutcome::failure(LOCKED_MESSAGE);
        }
        self.try_pull(session).await.into()
    }

    async fn try_pull(&self, session: &mut VaultSession) -> Result<Pulled> {
        let pulled = self.client.pull_vault().await?;
        pulled.vault.validate()?;
        self.store.save(&pulled.vault).await?;
        info!(version = %pulled.version_code, "Local vault replaced from host");

        let key_matches = session
            .master_key()
            .is_some_and(|key| verify_check_hash(key, &pulled.vault.metadata.check_hash));
        if !key_matches {
            warn!("Pulled vault uses a different password, locking session");
            session.lock();
            if let Some(keystore) = &self.keystore {
                keystore.delete(ACCOUNT_MASTER_KEY)?;
            }
        }

        Ok(Pulled {
            version_code: pulled.version_code,
            entries: pulled.vault.entries.len(),
            unlock_required: !key_matches,
        })
    }

    /// Send the whole local vault to the host.
    pub async fn push(&self, session: &VaultSession) -> SyncOutcome<Pushed> {
        if !session.is_unlocked() {
            return SyncOutcome::failure(LOCKED_MESSAGE);
        }
        self.try_push().await.into()
    }

    async fn try_push(&self) -> Result<Pushed> {
        let doc = self
            .store
            .load_optional()
            .await?
            .ok_or_else(|| Error::VaultNotFound(NO_VAULT_MESSAGE.to_string()))?;
        let version_code = self.client.push_vault(&doc).await?;
        Ok(Pushed { version_code })
    }

    fn require_keystore(&self) -> Result<&Arc<dyn KeyStore>> {
        self.keystore
            .as_ref()
            .ok_or_else(|| Error::Keystore("No keystore configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Announcement, MemoryNetwork, ServiceAdvertiser};
    use lanvault_crypto::{MasterKey, KEY_LENGTH};
    use lanvault_storage::MemoryProvider;
    use lanvault_vault::MemoryKeyStore;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn service(keystore: Option<MemoryKeyStore>) -> SyncService {
        let store = Arc::new(VaultStore::at_root(Arc::new(MemoryProvider::new())).unwrap());
        let settings = SyncClientConfig {
            discovery_timeout: Duration::from_millis(200),
            ..SyncClientConfig::default()
        };
        SyncService::new(
            settings,
            store,
            keystore.map(|k| Arc::new(k) as Arc<dyn KeyStore>),
        )
        .unwrap()
    }

    fn unlocked() -> VaultSession {
        VaultSession::unlocked(MasterKey::from_bytes([3u8; KEY_LENGTH]))
    }

    #[tokio::test]
    async fn test_locked_session_refused() {
        let service = service(None);
        let mut session = VaultSession::locked();

        let pulled = service.pull(&mut session).await;
        assert_eq!(pulled.error.as_deref(), Some(LOCKED_MESSAGE));
        let pushed = service.push(&session).await;
        assert_eq!(pushed.error.as_deref(), Some(LOCKED_MESSAGE));
    }

    #[tokio::test]
    async fn test_push_without_local_vault() {
        let service = service(None);
        service.client().set_config("http://127.0.0.1:9", "tok").unwrap();

        let outcome = service.push(&unlocked()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains(NO_VAULT_MESSAGE));
    }

    #[tokio::test]
    async fn test_unconfigured_pull_fails_without_writing() {
        let service = service(None);
        let mut session = unlocked();
        let outcome = service.pull(&mut session).await;
        assert!(!outcome.success);
        assert!(!service.store.exists().await.unwrap());
        assert!(session.is_unlocked());
    }

    #[test]
    fn test_config_roundtrip_through_keystore() {
        let keystore = MemoryKeyStore::new();
        let first = service(Some(keystore.clone()));
        assert!(!first.load_config().success);

        assert!(first.save_config("http://10.0.0.2:3000/", "tok").success);
        assert_eq!(
            keystore.get(ACCOUNT_SYNC_HOST_URL).unwrap().unwrap().as_str(),
            "http://10.0.0.2:3000"
        );

        let second = service(Some(keystore));
        let loaded = second.load_config().into_result().unwrap();
        assert_eq!(loaded.auth_token.as_deref(), Some("tok"));
        assert!(second.client().is_configured());
    }

    #[test]
    fn test_invalid_config_not_persisted() {
        let keystore = MemoryKeyStore::new();
        let service = service(Some(keystore.clone()));
        assert!(!service.save_config("not a url", "tok").success);
        assert!(keystore.get(ACCOUNT_SYNC_TOKEN).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discover_outcome() {
        let service = service(None);
        let network = MemoryNetwork::new();

        let none = service.discover(&network).await;
        assert!(none.success);
        assert!(none.data.unwrap().host.is_none());

        let mut announcement = Announcement::sync_host(3000, "1.0.0");
        announcement.addresses = vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))];
        let _ad = network.advertise(&announcement).unwrap();

        let found = service.discover(&network).await.into_result().unwrap();
        assert_eq!(found.host.unwrap().url, "http://10.0.0.7:3000");
    }
}
