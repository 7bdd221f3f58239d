//! Entry operations on an unlocked vault.
//!
//! Every operation takes the caller's session. When the session holds no
//! key the operation is refused with a negative result (`None` or `false`)
//! instead of an error, and the vault is neither read for secrets nor
//! modified.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::document::{Validity, VaultEntry};
use crate::session::VaultSession;
use crate::store::VaultStore;
use lanvault_common::{EntryId, Error, Result};
use lanvault_crypto::{decrypt_to_string, encrypt_str, SealedField};

/// Fields supplied when creating or replacing an entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub username: String,
    pub password: Zeroizing<String>,
    /// `None` means infinite for a new entry and unchanged for an update.
    pub validity: Option<Validity>,
}

impl NewEntry {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("Entry title cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Entry-level operations over a vault store.
pub struct VaultOperations<'a> {
    store: &'a VaultStore,
}

impl<'a> VaultOperations<'a> {
    pub fn new(store: &'a VaultStore) -> Self {
        Self { store }
    }

    /// All entries in stored order, secrets still sealed.
    ///
    /// A vault that was never created lists as empty.
    pub async fn list_entries(&self, session: &VaultSession) -> Result<Option<Vec<VaultEntry>>> {
        if !session.is_unlocked() {
            return Ok(None);
        }
        let entries = self
            .store
            .load_optional()
            .await?
            .map(|doc| doc.entries)
            .unwrap_or_default();
        Ok(Some(entries))
    }

    /// Seal the password and append a new entry.
    ///
    /// # Postconditions
    /// - The entry gets a fresh id, a fresh IV and the current time as
    ///   its creation date
    ///
    /// # Errors
    /// - `Error::VaultNotFound` if no vault exists
    /// - `Error::InvalidInput` if the title is empty
    pub async fn add_entry(
        &self,
        session: &VaultSession,
        entry: NewEntry,
    ) -> Result<Option<EntryId>> {
        let Some(key) = session.master_key() else {
            return Ok(None);
        };
        entry.validate()?;

        let sealed = encrypt_str(key, &entry.password)?;
        let id = EntryId::generate();
        let mut record = VaultEntry {
            id: id.clone(),
            title: entry.title,
            username: entry.username,
            password: String::new(),
            iv: String::new(),
            auth_tag: String::new(),
            created_at: Some(Utc::now()),
            validity: entry.validity.unwrap_or_default(),
        };
        record.set_sealed_password(&sealed);

        self.store
            .update(move |doc| {
                doc.entries.push(record);
                Ok(Some(()))
            })
            .await?;

        info!(id = %id, "Entry added");
        Ok(Some(id))
    }

    /// Replace title, username and password of an entry, and its validity
    /// when one is given.
    ///
    /// The password is re-sealed under a new IV. Id and creation date are
    /// kept. Returns `false` if the session is locked or the id is unknown.
    pub async fn update_entry(
        &self,
        session: &VaultSession,
        id: &EntryId,
        entry: NewEntry,
    ) -> Result<bool> {
        let Some(key) = session.master_key() else {
            return Ok(false);
        };
        entry.validate()?;

        let sealed = encrypt_str(key, &entry.password)?;
        let updated = self
            .store
            .update(|doc| {
                let Some(existing) = doc.entry_mut(id) else {
                    return Ok(None);
                };
                existing.title = entry.title;
                existing.username = entry.username;
                if let Some(validity) = entry.validity {
                    existing.validity = validity;
                }
                existing.set_sealed_password(&sealed);
                Ok(Some(()))
            })
            .await?
            .is_some();

        if updated {
            info!(id = %id, "Entry updated");
        } else {
            debug!(id = %id, "Update skipped, entry not found");
        }
        Ok(updated)
    }

    /// Remove an entry. Returns `false` if the session is locked or the id
    /// is unknown.
    pub async fn delete_entry(&self, session: &VaultSession, id: &EntryId) -> Result<bool> {
        if !session.is_unlocked() {
            return Ok(false);
        }

        let removed = self
            .store
            .update(|doc| {
                let before = doc.entries.len();
                doc.entries.retain(|e| &e.id != id);
                Ok((doc.entries.len() != before).then_some(()))
            })
            .await?
            .is_some();

        if removed {
            info!(id = %id, "Entry deleted");
        }
        Ok(removed)
    }

    /// Decrypt the password of one entry.
    ///
    /// # Errors
    /// - `Error::NotFound` if the id is unknown
    /// - `Error::Integrity` if the stored ciphertext does not authenticate
    pub async fn reveal_password(
        &self,
        session: &VaultSession,
        id: &EntryId,
    ) -> Result<Option<Zeroizing<String>>> {
        if !session.is_unlocked() {
            return Ok(None);
        }
        let doc = self.store.load().await?;
        let entry = doc
            .entry(id)
            .ok_or_else(|| Error::NotFound(format!("Entry not found: {}", id)))?;
        self.decrypt_field(session, &entry.sealed_password()?)
    }

    /// Decrypt an arbitrary sealed field with the session key.
    ///
    /// # Errors
    /// - `Error::Integrity` if the field does not authenticate
    pub fn decrypt_field(
        &self,
        session: &VaultSession,
        field: &SealedField,
    ) -> Result<Option<Zeroizing<String>>> {
        let Some(key) = session.master_key() else {
            return Ok(None);
        };
        decrypt_to_string(key, field).map(Some)
    }

    /// Entries whose validity has lapsed at `now`.
    pub async fn expired_entries(
        &self,
        session: &VaultSession,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<VaultEntry>>> {
        Ok(self.list_entries(session).await?.map(|entries| {
            entries
                .into_iter()
                .filter(|e| e.is_expired(now))
                .collect()
        }))
    }
}
