//! Secure storage for small secrets kept between runs.
//!
//! Three accounts are used under one service name: the remembered master
//! key (hex), the sync token, and the sync host URL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

use lanvault_common::{Error, Result};

/// Service name under which all accounts are stored.
pub const KEYSTORE_SERVICE: &str = "LanVault";

/// Account holding the hex master key after a successful unlock.
pub const ACCOUNT_MASTER_KEY: &str = "MasterKey";

/// Account holding the sync host bearer token.
pub const ACCOUNT_SYNC_TOKEN: &str = "sync-token";

/// Account holding the sync host base URL.
pub const ACCOUNT_SYNC_HOST_URL: &str = "sync-host-url";

/// Per-account secret storage.
pub trait KeyStore: Send + Sync {
    /// Store or replace the secret for `account`.
    fn set(&self, account: &str, secret: &str) -> Result<()>;

    /// Fetch the secret for `account`, or `None` if nothing is stored.
    fn get(&self, account: &str) -> Result<Option<Zeroizing<String>>>;

    /// Remove the secret for `account`. Removing a missing account succeeds.
    fn delete(&self, account: &str) -> Result<()>;
}

/// Process-local keystore. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    secrets: Arc<Mutex<HashMap<String, Zeroizing<String>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::Keystore("Keystore lock poisoned".to_string())
    }
}

impl KeyStore for MemoryKeyStore {
    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.secrets
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(account.to_string(), Zeroizing::new(secret.to_string()));
        Ok(())
    }

    fn get(&self, account: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self
            .secrets
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(account)
            .cloned())
    }

    fn delete(&self, account: &str) -> Result<()> {
        self.secrets
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(account);
        Ok(())
    }
}

/// Keystore backed by the platform credential store
/// (Keychain, Credential Manager, or the Secret Service).
#[cfg(feature = "os-keystore")]
#[derive(Debug, Clone)]
pub struct OsKeyStore {
    service: String,
}

#[cfg(feature = "os-keystore")]
impl OsKeyStore {
    pub fn new() -> Self {
        Self::with_service(KEYSTORE_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account).map_err(|e| {
            Error::Keystore(format!("Failed to initialize keyring entry: {}", e))
        })
    }
}

#[cfg(feature = "os-keystore")]
impl Default for OsKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "os-keystore")]
impl KeyStore for OsKeyStore {
    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .map_err(|e| Error::Keystore(format!("Failed to store {}: {}", account, e)))
    }

    fn get(&self, account: &str) -> Result<Option<Zeroizing<String>>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Keystore(format!(
                "Failed to read {}: {}",
                account, e
            ))),
        }
    }

    fn delete(&self, account: &str) -> Result<()> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Keystore(format!(
                "Failed to remove {}: {}",
                account, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_keystore() {
        let store = MemoryKeyStore::new();
        assert!(store.get(ACCOUNT_SYNC_TOKEN).unwrap().is_none());

        store.set(ACCOUNT_SYNC_TOKEN, "t1").unwrap();
        store.set(ACCOUNT_SYNC_TOKEN, "t2").unwrap();
        assert_eq!(store.get(ACCOUNT_SYNC_TOKEN).unwrap().unwrap().as_str(), "t2");

        store.delete(ACCOUNT_SYNC_TOKEN).unwrap();
        store.delete(ACCOUNT_SYNC_TOKEN).unwrap();
        assert!(store.get(ACCOUNT_SYNC_TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_accounts_are_independent() {
        let store = MemoryKeyStore::new();
        store.set(ACCOUNT_SYNC_HOST_URL, "http://h:3000").unwrap();
        store.set(ACCOUNT_MASTER_KEY, "00").unwrap();
        store.delete(ACCOUNT_MASTER_KEY).unwrap();

        assert_eq!(
            store.get(ACCOUNT_SYNC_HOST_URL).unwrap().unwrap().as_str(),
            "http://h:3000"
        );
    }
}
