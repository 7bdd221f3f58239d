//! Authenticated encryption using AES-256-GCM.
//!
//! Every secret field is sealed on its own, so a fresh random 96-bit IV is
//! drawn for each call. The 128-bit tag is kept apart from the ciphertext
//! because the vault document stores the two in separate fields.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use zeroize::Zeroizing;

use crate::keys::{decode_fixed, MasterKey};
use lanvault_common::{Error, Result, SensitiveBytes};

/// IV size for AES-GCM (12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// One encrypted field: ciphertext, the IV it was sealed under, and its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_SIZE],
    pub auth_tag: [u8; TAG_SIZE],
}

impl SealedField {
    /// Rebuild a sealed field from its persisted hex parts.
    ///
    /// Malformed parts can never authenticate, so they are reported as an
    /// integrity failure rather than an input error.
    pub fn from_hex_parts(ciphertext: &str, iv: &str, auth_tag: &str) -> Result<Self> {
        let ciphertext = hex::decode(ciphertext.trim()).map_err(|_| Error::Integrity)?;
        let iv = decode_fixed::<IV_SIZE>(iv, "iv").map_err(|_| Error::Integrity)?;
        let auth_tag = decode_fixed::<TAG_SIZE>(auth_tag, "auth tag").map_err(|_| Error::Integrity)?;
        Ok(Self {
            ciphertext,
            iv,
            auth_tag,
        })
    }

    /// Hex encodings of (ciphertext, iv, auth tag).
    pub fn to_hex_parts(&self) -> (String, String, String) {
        (
            hex::encode(&self.ciphertext),
            hex::encode(self.iv),
            hex::encode(self.auth_tag),
        )
    }
}

/// Encrypt plaintext under the master key.
///
/// # Postconditions
/// - A new random IV is generated for this call
/// - Ciphertext length equals plaintext length
///
/// # Errors
/// - Returns error if the cipher fails
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<SealedField> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    // aes-gcm appends the tag to the ciphertext
    if sealed.len() < TAG_SIZE {
        return Err(Error::Crypto("Ciphertext missing auth tag".to_string()));
    }
    let tag_start = sealed.len() - TAG_SIZE;
    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&nonce);

    Ok(SealedField {
        ciphertext: sealed,
        iv,
        auth_tag,
    })
}

/// Decrypt a sealed field.
///
/// The tag is verified before any plaintext is released, and the
/// plaintext is wiped when the returned buffer is dropped.
///
/// # Errors
/// - `Error::Integrity` if the key is wrong or any part was altered
pub fn decrypt(key: &MasterKey, field: &SealedField) -> Result<SensitiveBytes> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&field.iv);

    let mut combined = Vec::with_capacity(field.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&field.ciphertext);
    combined.extend_from_slice(&field.auth_tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map(SensitiveBytes::new)
        .map_err(|_| Error::Integrity)
}

/// Encrypt a UTF-8 string.
pub fn encrypt_str(key: &MasterKey, plaintext: &str) -> Result<SealedField> {
    encrypt(key, plaintext.as_bytes())
}

/// Decrypt to a UTF-8 string.
pub fn decrypt_to_string(key: &MasterKey, field: &SealedField) -> Result<Zeroizing<String>> {
    let bytes = decrypt(key, field)?;
    std::str::from_utf8(bytes.as_bytes())
        .map(|s| Zeroizing::new(s.to_owned()))
        .map_err(|_| Error::Integrity)
}
