//! Cryptographic primitives for LanVault.
//!
//! This module provides:
//! - Password-based key derivation using PBKDF2-HMAC-SHA512
//! - Unlock verification through a one-way check hash
//! - Per-field authenticated encryption using AES-256-GCM
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison for check hashes

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, decrypt_to_string, encrypt, encrypt_str, SealedField};
pub use kdf::{derive_key, hash_for_check, verify_check_hash, KDF_ITERATIONS};
pub use keys::{CheckHash, MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};
