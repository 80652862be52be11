//! Field encryption key: generation and text encoding

use base64::{engine::general_purpose::URL_SAFE, Engine};
use hms_core::{HmsError, HmsResult};
use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The deployment's 256-bit field encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct FieldKey {
    bytes: [u8; KEY_SIZE],
}

impl FieldKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Parse the URL-safe base64 form stored in the env file.
    pub fn from_encoded(encoded: &str) -> HmsResult<Self> {
        let mut decoded = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| HmsError::Config(format!("field key is not valid base64: {e}")))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(HmsError::Config(format!(
                "field key has wrong size: {len} bytes (expected {KEY_SIZE})"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }

    /// URL-safe base64, padded (44 characters)
    pub fn to_encoded(&self) -> String {
        URL_SAFE.encode(self.bytes)
    }
}

impl PartialEq for FieldKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for FieldKey {}

impl Drop for FieldKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit field encryption key.
pub fn generate_field_key() -> FieldKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    FieldKey::from_bytes(bytes)
}
