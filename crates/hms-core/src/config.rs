use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HmsError, HmsResult};

/// Top-level configuration (loaded from hms.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HmsConfig {
    pub database: DatabaseConfig,
    pub keys: KeysConfig,
    pub audit: AuditConfig,
    pub retention: RetentionConfig,
    pub auth: AuthConfig,
}

impl HmsConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned and a warning is logged.
    pub fn load(path: &Path) -> HmsResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| HmsError::Config(format!("reading config {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| HmsError::Config(format!("parsing config {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file (default: data/hospital.db)
    pub path: PathBuf,
}

/// Where the field encryption key lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Line-oriented NAME=value file the key is persisted to (default: .env)
    pub env_file: PathBuf,
    /// Entry name of the key, also checked in the process environment first
    pub key_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Audit details are truncated to this many characters
    pub details_max_len: usize,
    /// Entries returned by `audit list` when no limit is given
    pub default_limit: usize,
    /// Trailing window for per-day activity counts
    pub trend_window_days: u32,
}

/// Advisory retention window. Records past it are flagged, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Scheme used when hashing new passwords. Verification accepts both.
    pub password_scheme: PasswordScheme,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    /// Unsalted SHA-256, hex encoded
    #[default]
    Sha256,
    /// Salted Argon2id, PHC string encoded
    Argon2id,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/hospital.db"),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            key_name: "FIELD_ENCRYPTION_KEY".into(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            details_max_len: 250,
            default_limit: 200,
            trend_window_days: 14,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 365 }
    }
}
