//! Common error types for LanVault.

use thiserror::Error;

/// Top-level error type for LanVault operations.
///
/// A locked session is not an error: privileged vault operations report it
/// as `None`/`false` instead of one of these variants.
#[derive(Debug, Error)]
pub enum Error {
    /// The password did not reproduce the stored check hash.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No vault document exists at the expected location.
    #[error("Vault not found: {0}")]
    VaultNotFound(String),

    /// Authenticated decryption rejected the ciphertext or its tag.
    #[error("Integrity check failed")]
    Integrity,

    /// Missing or incorrect bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    /// A sync operation was attempted before host URL/token were set.
    #[error("Sync not configured: {0}")]
    NotConfigured(String),

    /// Transport failure or non-success response from the sync host.
    #[error("Network error: {0}")]
    Network(String),

    /// Snapshot index outside the retained generations, or an empty slot.
    #[error("Version not found: {0}")]
    VersionNotFound(usize),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage object not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Secure storage (OS keychain) access failed.
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// Local-network discovery failed to start.
    #[error("Discovery error: {0}")]
    Discovery(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_do_not_leak_details() {
        assert_eq!(Error::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(Error::Integrity.to_string(), "Integrity check failed");
        assert_eq!(Error::VersionNotFound(7).to_string(), "Version not found: 7");
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
