use std::path::PathBuf;

use thiserror::Error;

pub type HmsResult<T> = Result<T, HmsError>;

#[derive(Debug, Error)]
pub enum HmsError {
    /// The key config store could not be read or written. Fatal at startup.
    #[error("config write error ({}): {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ciphertext is malformed or was sealed under a different key.
    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HmsError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        HmsError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HmsError::NotFound { .. })
    }

    pub fn is_decryption(&self) -> bool {
        matches!(self, HmsError::Decryption(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, HmsError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = HmsError::not_found("patient", 42);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "patient 42 not found");
    }

    #[test]
    fn test_config_write_names_path() {
        let err = HmsError::ConfigWrite {
            path: PathBuf::from("/etc/hms/.env"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/etc/hms/.env"));
    }
}
