//! Key manager: obtain the field key, generating and persisting it exactly once
//!
//! Lookup chain (in order of precedence):
//!   1. `$<key_name>` process environment variable
//!   2. `<key_name>=...` entry in the env file
//!   3. freshly generated key, appended to the env file
//!
//! The file is parsed with `dotenvy`. Writes only ever append, and an
//! existing entry is never overwritten. Losing the env file makes every
//! sealed field unrecoverable, so a write failure aborts instead of falling
//! back to an ephemeral key.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use hms_core::{HmsError, HmsResult};

use crate::keys::{generate_field_key, FieldKey};

/// A line-oriented `NAME=value` file (UTF-8, newline terminated).
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the first entry for `name`. A missing file reads as "no entry".
    pub fn read_value(&self, name: &str) -> HmsResult<Option<String>> {
        let content = match self.read_raw()? {
            Some(content) => content,
            None => return Ok(None),
        };

        for entry in dotenvy::from_read_iter(content.as_slice()) {
            let (key, value) = entry.map_err(|e| self.parse_error(e))?;
            if key == name {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Append `name=value` unless an entry for `name` already exists.
    ///
    /// Existing lines are never rewritten. Returns `true` only when the
    /// appended value is the one a subsequent read yields; if another writer
    /// got its entry in first, that entry wins and `false` is returned.
    pub fn persist_if_absent(&self, name: &str, value: &str) -> HmsResult<bool> {
        if self.read_value(name)?.is_some() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
            }
        }

        let needs_newline = self
            .read_raw()?
            .is_some_and(|content| !content.is_empty() && !content.ends_with(b"\n"));

        let mut file = open_append(&self.path).map_err(|e| self.write_error(e))?;
        let line = if needs_newline {
            format!("\n{name}={value}\n")
        } else {
            format!("{name}={value}\n")
        };
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.write_error(e))?;

        Ok(self.read_value(name)?.as_deref() == Some(value))
    }

    fn read_raw(&self) -> HmsResult<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.write_error(source)),
        }
    }

    fn write_error(&self, source: std::io::Error) -> HmsError {
        HmsError::ConfigWrite {
            path: self.path.clone(),
            source,
        }
    }

    fn parse_error(&self, err: dotenvy::Error) -> HmsError {
        match err {
            dotenvy::Error::Io(source) => self.write_error(source),
            other => HmsError::Config(format!("parsing {}: {other}", self.path.display())),
        }
    }
}

/// Open for appending, creating the file owner-only (0600) if absent.
#[cfg(unix)]
fn open_append(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().create(true).append(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Obtain the field key named `key_name`.
///
/// Repeated calls return the same key as long as the first call persisted it.
pub fn obtain_key(env_file: &Path, key_name: &str) -> HmsResult<FieldKey> {
    if let Ok(encoded) = std::env::var(key_name) {
        if !encoded.trim().is_empty() {
            tracing::debug!(key_name, "field key loaded from environment");
            return FieldKey::from_encoded(&encoded);
        }
    }

    let store = EnvFile::new(env_file);
    if let Some(encoded) = store.read_value(key_name)? {
        if !encoded.is_empty() {
            tracing::debug!(
                key_name,
                path = %env_file.display(),
                "field key loaded from env file"
            );
            return FieldKey::from_encoded(&encoded);
        }
    }

    let key = generate_field_key();
    if store.persist_if_absent(key_name, &key.to_encoded())? {
        tracing::info!(
            key_name,
            path = %env_file.display(),
            "generated and persisted new field key"
        );
        return Ok(key);
    }

    // An entry appeared between our read and write; the persisted one wins.
    match store.read_value(key_name)? {
        Some(encoded) if !encoded.is_empty() => FieldKey::from_encoded(&encoded),
        _ => Err(HmsError::Config(format!(
            "{key_name} entry in {} is empty",
            env_file.display()
        ))),
    }
}
