//! Per-field XChaCha20-Poly1305 sealing
//!
//! Sealed field format (URL-safe base64 of):
//! ```text
//! [1 byte: format version][24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = format version
//! ```
//!
//! A fresh nonce per call makes sealing non-deterministic: the same
//! plaintext never produces the same token twice.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hms_core::{HmsError, HmsResult};
use rand::RngCore;

use crate::keys::FieldKey;
use crate::{NONCE_SIZE, TAG_SIZE};

const FORMAT_VERSION: u8 = 0x01;

/// Seals and opens field values under one key.
///
/// Held by the record store as an injected dependency; there is no
/// process-wide cipher.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: XChaCha20Poly1305,
}

impl FieldCipher {
    pub fn new(key: &FieldKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Seal a nullable field. `None` passes through.
    pub fn seal(&self, plaintext: Option<&str>) -> HmsResult<Option<String>> {
        plaintext.map(|p| self.seal_str(p)).transpose()
    }

    /// Open a nullable field. `None` passes through.
    pub fn open(&self, token: Option<&str>) -> HmsResult<Option<String>> {
        token.map(|t| self.open_str(t)).transpose()
    }

    pub fn seal_str(&self, plaintext: &str) -> HmsResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &[FORMAT_VERSION],
                },
            )
            .map_err(|e| HmsError::Other(anyhow::anyhow!("field encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        sealed.push(FORMAT_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(sealed))
    }

    pub fn open_str(&self, token: &str) -> HmsResult<String> {
        let sealed = URL_SAFE
            .decode(token.trim())
            .map_err(|e| HmsError::Decryption(format!("sealed field is not valid base64: {e}")))?;

        if sealed.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(HmsError::Decryption(format!(
                "sealed field too short: {} bytes (minimum {})",
                sealed.len(),
                1 + NONCE_SIZE + TAG_SIZE
            )));
        }

        let (version, rest) = sealed.split_at(1);
        if version[0] != FORMAT_VERSION {
            return Err(HmsError::Decryption(format!(
                "unsupported sealed field version: {:#04x}",
                version[0]
            )));
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: version,
                },
            )
            .map_err(|_| {
                HmsError::Decryption("invalid key or corrupted sealed field".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| HmsError::Decryption(format!("opened field is not UTF-8: {e}")))
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_field_key;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&generate_field_key())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = cipher();
        let sealed = cipher.seal_str("Type 2 Diabetes").unwrap();
        assert_eq!(cipher.open_str(&sealed).unwrap(), "Type 2 Diabetes");
    }

    #[test]
    fn test_none_passthrough() {
        let cipher = cipher();
        assert_eq!(cipher.seal(None).unwrap(), None);
        assert_eq!(cipher.open(None).unwrap(), None);
    }

    #[test]
    fn test_empty_string_is_sealed() {
        let cipher = cipher();
        let sealed = cipher.seal(Some("")).unwrap().unwrap();
        assert!(!sealed.is_empty());
        assert_eq!(cipher.open(Some(&sealed)).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_sealed_size() {
        let cipher = cipher();
        let sealed = cipher.seal_str("0123456789").unwrap();
        let raw = URL_SAFE.decode(&sealed).unwrap();

        // version (1) + nonce (24) + plaintext (10) + tag (16) = 51
        assert_eq!(raw.len(), 1 + NONCE_SIZE + 10 + TAG_SIZE);
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = cipher().seal_str("secret").unwrap();
        let err = cipher().open_str(&sealed).unwrap_err();
        assert!(err.is_decryption());
    }

    #[test]
    fn test_tampered_token() {
        let cipher = cipher();
        let sealed = cipher.seal_str("secret data").unwrap();
        let mut raw = URL_SAFE.decode(&sealed).unwrap();
        // Flip a byte in the ciphertext (after version + nonce)
        raw[1 + NONCE_SIZE + 2] ^= 0xFF;

        let err = cipher.open_str(&URL_SAFE.encode(raw)).unwrap_err();
        assert!(err.is_decryption(), "tampered ciphertext must fail");
    }

    #[test]
    fn test_unknown_version() {
        let cipher = cipher();
        let sealed = cipher.seal_str("secret").unwrap();
        let mut raw = URL_SAFE.decode(&sealed).unwrap();
        raw[0] = 0x7F;

        let err = cipher.open_str(&URL_SAFE.encode(raw)).unwrap_err();
        assert!(err.is_decryption());
    }

    #[test]
    fn test_malformed_tokens() {
        let cipher = cipher();
        assert!(cipher.open_str("***not base64***").unwrap_err().is_decryption());
        let short = URL_SAFE.encode([FORMAT_VERSION; 8]);
        assert!(cipher.open_str(&short).unwrap_err().is_decryption());
        assert!(cipher.open(Some("")).unwrap_err().is_decryption());
    }
}
