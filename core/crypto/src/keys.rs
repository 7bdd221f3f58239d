//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory. Values that are persisted
//! (salt, check hash) serialize as lowercase hex.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use lanvault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the KDF salt in bytes (256-bit).
pub const SALT_LENGTH: usize = 32;

/// Length of the check hash in bytes (SHA-256).
pub const CHECK_HASH_LENGTH: usize = 32;

/// Decode a hex string into a fixed-size array.
pub(crate) fn decode_fixed<const N: usize>(hex_str: &str, what: &str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(hex_str.trim(), &mut out)
        .map_err(|e| Error::InvalidInput(format!("Invalid {} encoding: {}", what, e)))?;
    Ok(out)
}

/// Master key derived from the vault password.
///
/// Lives only inside a session; it is never written to the vault document.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Hex encoding used when handing the key to secure OS storage.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key))
    }

    /// Restore a key from its hex encoding.
    ///
    /// # Errors
    /// - Returns error if the input is not 64 hex characters
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let mut bytes = decode_fixed::<KEY_LENGTH>(hex_key, "key")?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Salt for key derivation.
///
/// Generated once when a vault is created and never changed afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse the persisted hex form.
    pub fn from_hex(hex_salt: &str) -> Result<Self> {
        decode_fixed::<SALT_LENGTH>(hex_salt, "salt").map(Self)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }

    /// Persisted hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// One-way digest of a master key, stored to verify unlock attempts.
#[derive(Clone)]
pub struct CheckHash([u8; CHECK_HASH_LENGTH]);

impl CheckHash {
    /// Create from digest bytes.
    pub fn from_bytes(bytes: [u8; CHECK_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse the persisted hex form.
    pub fn from_hex(hex_hash: &str) -> Result<Self> {
        decode_fixed::<CHECK_HASH_LENGTH>(hex_hash, "check hash").map(Self)
    }

    /// Get the digest bytes.
    pub fn as_bytes(&self) -> &[u8; CHECK_HASH_LENGTH] {
        &self.0
    }

    /// Persisted hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Constant-time equality.
    pub fn ct_eq(&self, other: &CheckHash) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for CheckHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckHash({})", self.to_hex())
    }
}

impl Serialize for CheckHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CheckHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
