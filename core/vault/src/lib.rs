//! Vault engine for LanVault.
//!
//! This module provides:
//! - The persisted vault document and its entry model
//! - Whole-document storage with a single-writer lock
//! - Session handling with explicit, caller-owned key lifetime
//! - Entry operations gated on an unlocked session
//! - A keystore seam for remembering the key and sync settings
//!
//! # Architecture
//! The vault module sits between the user interface and the storage
//! provider. Every secret field is sealed individually with the session's
//! master key before it reaches the document.

pub mod document;
pub mod keystore;
pub mod manager;
pub mod operations;
pub mod session;
pub mod store;

pub use document::{SyncMetadata, Validity, VaultDocument, VaultEntry, VaultMetadata};
pub use keystore::{KeyStore, MemoryKeyStore};
#[cfg(feature = "os-keystore")]
pub use keystore::OsKeyStore;
pub use manager::VaultManager;
pub use operations::{NewEntry, VaultOperations};
pub use session::{SessionHandle, SessionState, VaultSession};
pub use store::{VaultStore, VAULT_FILENAME};
