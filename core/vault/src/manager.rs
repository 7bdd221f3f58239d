//! Vault manager for creating, unlocking and locking a vault.

use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::document::VaultDocument;
use crate::keystore::{KeyStore, ACCOUNT_MASTER_KEY};
use crate::session::VaultSession;
use crate::store::VaultStore;
use lanvault_common::{Error, Result};
use lanvault_crypto::{derive_key, hash_for_check, verify_check_hash, MasterKey, Salt};

/// Creates vaults and turns passwords into sessions.
pub struct VaultManager {
    store: Arc<VaultStore>,
    keystore: Option<Arc<dyn KeyStore>>,
}

impl VaultManager {
    /// Create a manager without a keystore. Keys are never remembered.
    pub fn new(store: Arc<VaultStore>) -> Self {
        Self {
            store,
            keystore: None,
        }
    }

    /// Create a manager that remembers the key after a successful unlock.
    pub fn with_keystore(store: Arc<VaultStore>, keystore: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            keystore: Some(keystore),
        }
    }

    /// The underlying document store.
    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    /// Whether a vault has been created.
    pub async fn exists(&self) -> Result<bool> {
        self.store.exists().await
    }

    /// Create a new, empty vault protected by `password`.
    ///
    /// # Preconditions
    /// - No vault exists yet
    /// - Password must not be empty
    ///
    /// # Postconditions
    /// - A fresh random salt and its check hash are persisted
    /// - Returns an unlocked session
    ///
    /// # Errors
    /// - `Error::InvalidInput` if a vault already exists or the password is empty
    pub async fn init(&self, password: &str) -> Result<VaultSession> {
        if self.store.exists().await? {
            return Err(Error::InvalidInput("Vault already exists".to_string()));
        }

        let salt = Salt::generate();
        let key = derive_off_thread(password, &salt).await?;
        let doc = VaultDocument::new(salt, hash_for_check(&key));
        self.store.save(&doc).await?;

        info!(path = %self.store.path(), "Vault created");
        Ok(VaultSession::unlocked(key))
    }

    /// Derive the key from `password` and check it against the stored hash.
    ///
    /// # Postconditions
    /// - On success the key is handed to the keystore, if one is configured
    ///
    /// # Errors
    /// - `Error::VaultNotFound` if no vault exists
    /// - `Error::InvalidCredentials` if the password is wrong
    pub async fn unlock(&self, password: &str) -> Result<VaultSession> {
        let doc = self.store.load().await?;
        let key = derive_off_thread(password, &doc.metadata.salt).await?;

        if !verify_check_hash(&key, &doc.metadata.check_hash) {
            warn!("Unlock rejected: password does not match");
            return Err(Error::InvalidCredentials);
        }

        if let Some(keystore) = &self.keystore {
            // Best effort; the caller still gets a session
            if let Err(e) = keystore.set(ACCOUNT_MASTER_KEY, &key.to_hex()) {
                warn!(error = %e, "Could not remember master key");
            }
        }

        info!("Vault unlocked");
        Ok(VaultSession::unlocked(key))
    }

    /// Unlock with a previously remembered key.
    ///
    /// Returns `None` when no keystore is configured, nothing is remembered,
    /// or the remembered key no longer matches the vault. A stale key is
    /// removed from the keystore.
    pub async fn unlock_from_keystore(&self) -> Result<Option<VaultSession>> {
        let Some(keystore) = &self.keystore else {
            return Ok(None);
        };
        let Some(hex_key) = keystore.get(ACCOUNT_MASTER_KEY)? else {
            debug!("No remembered master key");
            return Ok(None);
        };

        let doc = self.store.load().await?;
        let key = match MasterKey::from_hex(&hex_key) {
            Ok(key) if verify_check_hash(&key, &doc.metadata.check_hash) => key,
            _ => {
                warn!("Remembered master key does not match vault, discarding");
                keystore.delete(ACCOUNT_MASTER_KEY)?;
                return Ok(None);
            }
        };

        info!("Vault unlocked from keystore");
        Ok(Some(VaultSession::unlocked(key)))
    }

    /// Lock `session` and forget any remembered key.
    pub fn logout(&self, session: &mut VaultSession) -> Result<()> {
        session.lock();
        if let Some(keystore) = &self.keystore {
            keystore.delete(ACCOUNT_MASTER_KEY)?;
        }
        info!("Vault locked");
        Ok(())
    }
}

/// Run the key derivation on the blocking pool; it is deliberately slow.
async fn derive_off_thread(password: &str, salt: &Salt) -> Result<MasterKey> {
    let password = Zeroizing::new(password.as_bytes().to_vec());
    let salt = salt.clone();
    tokio::task::spawn_blocking(move || derive_key(&password, &salt))
        .await
        .map_err(|e| Error::Crypto(format!("Key derivation task failed: {}", e)))?
}
