//! One-way password hashing and verification
//!
//! Two stored formats are recognised:
//!   - 64 hex chars: unsalted SHA-256 of the UTF-8 password (default scheme)
//!   - `$argon2id$...`: salted Argon2id PHC string
//!
//! Callers only see `hash_password`/`verify_password`; the scheme behind a
//! stored digest is detected from its shape.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hms_core::config::PasswordScheme;
use hms_core::{HmsError, HmsResult};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Unsalted SHA-256, hex encoded (64 chars).
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Hash with an explicit scheme.
pub fn hash_password_with(password: &str, scheme: PasswordScheme) -> HmsResult<String> {
    match scheme {
        PasswordScheme::Sha256 => Ok(hash_password(password)),
        PasswordScheme::Argon2id => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| HmsError::Other(anyhow::anyhow!("Argon2id hashing failed: {e}")))
        }
    }
}

/// Check `password` against a stored digest.
///
/// Never fails: a malformed or unrecognised digest is simply a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with("$argon2") {
        return match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        };
    }

    let expected = match hex::decode(stored.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let actual = Sha256::digest(password.as_bytes());
    constant_time_eq(&actual, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_fixed_length_hex() {
        let digest = hash_password("admin123");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_sha256() {
        let digest = hash_password("admin123");
        assert!(verify_password("admin123", &digest));
        assert!(!verify_password("wrong", &digest));
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let digest = hash_password("doc123").to_uppercase();
        assert!(verify_password("doc123", &digest));
    }

    #[test]
    fn test_verify_malformed_digest_is_false() {
        assert!(!verify_password("admin123", ""));
        assert!(!verify_password("admin123", "zz-not-hex"));
        assert!(!verify_password("admin123", "abcd"));
        assert!(!verify_password("admin123", "$argon2id$garbage"));
    }

    #[test]
    fn test_argon2id_roundtrip() {
        let digest = hash_password_with("rec123", PasswordScheme::Argon2id).unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(verify_password("rec123", &digest));
        assert!(!verify_password("rec124", &digest));
    }

    #[test]
    fn test_argon2id_is_salted() {
        let a = hash_password_with("same", PasswordScheme::Argon2id).unwrap();
        let b = hash_password_with("same", PasswordScheme::Argon2id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_scheme_matches_default() {
        assert_eq!(
            hash_password_with("x", PasswordScheme::Sha256).unwrap(),
            hash_password("x")
        );
    }
}
