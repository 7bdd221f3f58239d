//! Key derivation using PBKDF2-HMAC-SHA512.
//!
//! The same password and salt always reproduce the same key, so the key
//! itself never has to be stored. Password correctness is checked against
//! a SHA-256 digest of the derived key.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256, Sha512};

use crate::keys::{CheckHash, MasterKey, Salt, KEY_LENGTH};
use lanvault_common::{Error, Result};

/// Number of PBKDF2 iterations.
pub const KDF_ITERATIONS: u32 = 100_000;

/// Derive a master key from a password and salt.
///
/// # Preconditions
/// - `password` must not be empty
///
/// # Postconditions
/// - Returns a 256-bit MasterKey
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns error if password is empty
///
/// # Security
/// - Password is not stored or logged
/// - The intermediate buffer is zeroized by `MasterKey`
pub fn derive_key(password: &[u8], salt: &Salt) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    // The salt enters the KDF in its persisted hex form; documents created
    // by earlier clients derive their keys that way.
    let salt_text = salt.to_hex();

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha512>(password, salt_text.as_bytes(), KDF_ITERATIONS, &mut key_bytes);

    Ok(MasterKey::from_bytes(key_bytes))
}

/// One-way digest of a key, used only for unlock verification.
pub fn hash_for_check(key: &MasterKey) -> CheckHash {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    CheckHash::from_bytes(out)
}

/// Check a candidate key against a stored check hash in constant time.
pub fn verify_check_hash(key: &MasterKey, expected: &CheckHash) -> bool {
    hash_for_check(key).ct_eq(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let password = b"test-password-123";
        let salt = Salt::from_bytes([42u8; 32]);

        let key1 = derive_key(password, &salt).unwrap();
        let key2 = derive_key(password, &salt).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let password = b"test-password-123";
        let salt1 = Salt::from_bytes([1u8; 32]);
        let salt2 = Salt::from_bytes([2u8; 32]);

        let key1 = derive_key(password, &salt1).unwrap();
        let key2 = derive_key(password, &salt2).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = Salt::from_bytes([42u8; 32]);

        let key1 = derive_key(b"password1", &salt).unwrap();
        let key2 = derive_key(b"password2", &salt).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let salt = Salt::generate();
        assert!(derive_key(b"", &salt).is_err());
    }

    #[test]
    fn test_derive_key_known_vector() {
        // PBKDF2-HMAC-SHA512("password", hex("00" * 32), 100000, 32)
        let salt = Salt::from_bytes([0u8; 32]);
        let key = derive_key(b"password", &salt).unwrap();

        let mut expected = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha512>(b"password", "00".repeat(32).as_bytes(), 100_000, &mut expected);
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_unlock_check() {
        let salt = Salt::from_bytes([99u8; 32]);
        let key = derive_key(b"secure-password", &salt).unwrap();
        let check = hash_for_check(&key);

        let again = derive_key(b"secure-password", &salt).unwrap();
        assert!(verify_check_hash(&again, &check));

        let wrong = derive_key(b"wrong-password", &salt).unwrap();
        assert!(!verify_check_hash(&wrong, &check));
    }

    #[test]
    fn test_check_hash_has_no_false_positives_for_random_keys() {
        use rand::RngCore;

        let key = MasterKey::from_bytes([5u8; KEY_LENGTH]);
        let check = hash_for_check(&key);

        let mut rng = rand::thread_rng();
        for _ in 0..2_000 {
            let mut candidate = [0u8; KEY_LENGTH];
            rng.fill_bytes(&mut candidate);
            if candidate == *key.as_bytes() {
                continue;
            }
            assert!(!verify_check_hash(&MasterKey::from_bytes(candidate), &check));
        }
    }

    #[test]
    fn test_check_hash_is_not_the_key() {
        let key = MasterKey::from_bytes([9u8; KEY_LENGTH]);
        assert_ne!(hash_for_check(&key).as_bytes(), key.as_bytes());
    }
}
