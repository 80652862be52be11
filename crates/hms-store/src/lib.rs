//! hms-store: patient records sealed at rest, masked on read, audited on access
//!
//! Write path for a patient:
//! ```text
//! plaintext → FieldCipher::seal → INSERT (name, contact, diagnosis, date_added)
//!           → rowid → mask_identity / mask_contact / mask_text → UPDATE masks
//! ```
//! Both steps run in one SQLite transaction, so a record is never visible
//! with sealed fields but no masks.
//!
//! Every logical operation is one transaction. Concurrent writers are
//! serialized by SQLite's own locking; there is no in-process coordination.

pub mod audit;
pub mod patients;
pub mod retention;
pub mod schema;
pub mod seed;
pub mod users;

pub use audit::truncate_details;
pub use retention::RetentionPolicy;
pub use seed::{DEMO_PATIENTS, DEMO_USERS};

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use hms_core::config::HmsConfig;
use hms_core::HmsResult;
use hms_crypto::FieldCipher;
use rusqlite::Connection;

/// Stored timestamps: UTC with microseconds, so text order is time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Default maximum length of audit details, in characters
pub const DEFAULT_DETAILS_MAX_LEN: usize = 250;

/// Record & audit store over one SQLite connection.
///
/// The field cipher is injected at construction; swapping keys means opening
/// a new store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    cipher: FieldCipher,
    details_max_len: usize,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path, cipher: FieldCipher) -> HmsResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened database");
        Self::from_connection(conn, cipher)
    }

    /// In-memory database, schema applied. Used by tests and dry runs.
    pub fn open_in_memory(cipher: FieldCipher) -> HmsResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, cipher)
    }

    /// Open using the database path and audit settings from `config`.
    pub fn from_config(config: &HmsConfig, cipher: FieldCipher) -> HmsResult<Self> {
        Ok(Self::open(&config.database.path, cipher)?
            .with_details_max_len(config.audit.details_max_len))
    }

    fn from_connection(conn: Connection, cipher: FieldCipher) -> HmsResult<Self> {
        schema::apply(&conn)?;
        Ok(Self {
            conn,
            cipher,
            details_max_len: DEFAULT_DETAILS_MAX_LEN,
        })
    }

    pub fn with_details_max_len(mut self, details_max_len: usize) -> Self {
        self.details_max_len = details_max_len;
        self
    }

    pub fn details_max_len(&self) -> usize {
        self.details_max_len
    }
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `now` minus `days`, clamped to the earliest representable instant.
pub(crate) fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Reject empty (or whitespace-only) required fields.
pub(crate) fn require_non_empty(field: &str, value: &str) -> HmsResult<()> {
    if value.trim().is_empty() {
        return Err(hms_core::HmsError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use hms_crypto::generate_field_key;

    pub fn memory_store() -> Store {
        Store::open_in_memory(FieldCipher::new(&generate_field_key())).unwrap()
    }

    /// Raw connection access for fixtures that need to backdate rows.
    pub fn conn(store: &Store) -> &Connection {
        &store.conn
    }
}
