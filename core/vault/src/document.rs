//! Vault document model.
//!
//! The JSON layout is shared by every device and by the sync host:
//!
//! ```json
//! {
//!   "metadata": { "salt": "<hex>", "check_hash": "<hex>" },
//!   "entries": [
//!     { "id": "...", "title": "...", "username": "...",
//!       "password": "<hex ciphertext>", "iv": "<hex>", "authTag": "<hex>",
//!       "createdAt": "<rfc3339>", "validity": 6 | "infinite" }
//!   ],
//!   "syncMetadata": { "versionCode": "v3", "timestamp": "<rfc3339>", "hash": "<hex>" }
//! }
//! ```

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use lanvault_common::{EntryId, Error, Result};
use lanvault_crypto::{CheckHash, SealedField, Salt};

/// Key-derivation metadata. Written once at vault creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultMetadata {
    pub salt: Salt,
    pub check_hash: CheckHash,
}

/// How long an entry's secret is considered current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Expires this many calendar months after creation.
    Months(u32),
    /// Never expires.
    #[default]
    Infinite,
}

impl Validity {
    /// Expiry instant for an entry created at `created_at`.
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Validity::Months(n) => created_at.checked_add_months(Months::new(*n)),
            Validity::Infinite => None,
        }
    }

    /// Parse the user-facing form: a month count or "infinite".
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("infinite") {
            return Ok(Validity::Infinite);
        }
        match value.parse::<u32>() {
            Ok(0) | Err(_) => Err(Error::InvalidInput(format!(
                "Validity must be a positive month count or \"infinite\", got {:?}",
                value
            ))),
            Ok(n) => Ok(Validity::Months(n)),
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Months(n) => write!(f, "{} months", n),
            Validity::Infinite => write!(f, "infinite"),
        }
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Validity::Months(n) => serializer.serialize_u32(*n),
            Validity::Infinite => serializer.serialize_str("infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for Validity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(0) => Err(serde::de::Error::custom("validity month count must be positive")),
            Raw::Count(n) => Ok(Validity::Months(n)),
            Raw::Text(s) => Validity::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// One stored secret. Only `password` is encrypted; it holds hex ciphertext
/// sealed under `iv` with `authTag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub id: EntryId,
    pub title: String,
    #[serde(default)]
    pub username: String,
    pub password: String,
    pub iv: String,
    pub auth_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validity: Validity,
}

impl VaultEntry {
    /// The encrypted password as a sealed field.
    ///
    /// # Errors
    /// - `Error::Integrity` if the stored hex parts are malformed
    pub fn sealed_password(&self) -> Result<SealedField> {
        SealedField::from_hex_parts(&self.password, &self.iv, &self.auth_tag)
    }

    /// Replace the encrypted password, IV and tag together.
    pub fn set_sealed_password(&mut self, sealed: &SealedField) {
        let (ciphertext, iv, tag) = sealed.to_hex_parts();
        self.password = ciphertext;
        self.iv = iv;
        self.auth_tag = tag;
    }

    /// When the secret expires, if it has a creation date and finite validity.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|created| self.validity.expires_at(created))
    }

    /// Whether the secret is past its validity at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

/// Host-assigned tag describing which accepted push produced a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub version_code: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

impl SyncMetadata {
    /// Format a counter value as a version code ("v7").
    pub fn version_code_for(counter: u64) -> String {
        format!("v{}", counter)
    }

    /// Numeric part of the version code, if it has the "v<N>" form.
    pub fn version_number(&self) -> Option<u64> {
        self.version_code.strip_prefix('v')?.parse().ok()
    }
}

/// A device's complete vault, read and written as a single unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultDocument {
    pub metadata: VaultMetadata,
    #[serde(default)]
    pub entries: Vec<VaultEntry>,
    #[serde(rename = "syncMetadata", default, skip_serializing_if = "Option::is_none")]
    pub sync_metadata: Option<SyncMetadata>,
}

impl VaultDocument {
    /// Create an empty vault for the given key-derivation metadata.
    pub fn new(salt: Salt, check_hash: CheckHash) -> Self {
        Self {
            metadata: VaultMetadata { salt, check_hash },
            entries: Vec::new(),
            sync_metadata: None,
        }
    }

    /// Look up an entry by id.
    pub fn entry(&self, id: &EntryId) -> Option<&VaultEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Look up an entry by id for modification.
    pub fn entry_mut(&mut self, id: &EntryId) -> Option<&mut VaultEntry> {
        self.entries.iter_mut().find(|e| &e.id == id)
    }

    /// Check structural invariants.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if two entries share an id
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate entry id: {}",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    /// SHA-256 (hex) over the canonical JSON of the document, excluding
    /// `syncMetadata`.
    ///
    /// Canonical here means object keys in sorted order, which is what
    /// `serde_json::Value` produces.
    pub fn content_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("syncMetadata");
        }
        let canonical = serde_json::to_vec(&value)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from storage and validate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc: Self = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }
}
