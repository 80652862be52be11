//! hms-crypto: data-protection primitives for patient records
//!
//! ```text
//! Field key (256-bit, random, persisted once as NAME=base64 in the env file)
//!   └── Field AEAD: XChaCha20-Poly1305 (key=field_key, nonce=random_192bit, AAD=format version)
//!
//! Masks: pure functions of plaintext (or record id), no key material
//! Passwords: SHA-256 hex (default) or Argon2id PHC string
//! ```

pub mod envelope;
pub mod keys;
pub mod keystore;
pub mod mask;
pub mod password;

pub use envelope::FieldCipher;
pub use keys::{generate_field_key, FieldKey};
pub use keystore::{obtain_key, EnvFile};
pub use mask::{is_digit, mask_contact, mask_identity, mask_text};
pub use password::{hash_password, hash_password_with, verify_password};

/// Size of a field key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
