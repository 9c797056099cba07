//! API key storage.
//!
//! Keys live in the env file as one comma-joined list under
//! [`KEYS_VAR`].  Every mutation rewrites that single line; list order is
//! stable and deletion shifts later keys down by one.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::envfile;

/// Env-file variable holding the comma-joined key list.
pub const KEYS_VAR: &str = "OPENAI_API_KEYS";

/// Failures for index-based or validated key mutations.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("key index {index} is out of range (have {len} key(s))")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("API key must not be empty")]
    Empty,
    #[error("API key must not contain ','")]
    ContainsSeparator,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// File-backed list of API keys.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored keys.  Empty when the file or variable is absent.
    pub fn load(&self) -> anyhow::Result<Vec<String>> {
        let raw = envfile::get(&self.path, KEYS_VAR)?.unwrap_or_default();
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect())
    }

    /// Append `key` and return the updated list.
    pub fn add(&self, key: &str) -> Result<Vec<String>, CredentialError> {
        let key = validate(key)?;
        let mut keys = self.load()?;
        keys.push(key.to_string());
        self.persist(&keys)?;
        info!(count = keys.len(), "API key added");
        Ok(keys)
    }

    /// Remove the key at zero-based `index` and return it.
    pub fn delete(&self, index: usize) -> Result<String, CredentialError> {
        let mut keys = self.load()?;
        check_index(index, keys.len())?;
        let removed = keys.remove(index);
        self.persist(&keys)?;
        info!(index, count = keys.len(), "API key deleted");
        Ok(removed)
    }

    /// Replace the key at zero-based `index` with `key`.
    pub fn edit(&self, index: usize, key: &str) -> Result<(), CredentialError> {
        let key = validate(key)?;
        let mut keys = self.load()?;
        check_index(index, keys.len())?;
        keys[index] = key.to_string();
        self.persist(&keys)?;
        info!(index, "API key edited");
        Ok(())
    }

    fn persist(&self, keys: &[String]) -> anyhow::Result<()> {
        if keys.is_empty() {
            envfile::remove(&self.path, KEYS_VAR)
        } else {
            envfile::set(&self.path, KEYS_VAR, &keys.join(","))
        }
    }
}

fn validate(key: &str) -> Result<&str, CredentialError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CredentialError::Empty);
    }
    if key.contains(',') {
        return Err(CredentialError::ContainsSeparator);
    }
    Ok(key)
}

fn check_index(index: usize, len: usize) -> Result<(), CredentialError> {
    if index >= len {
        return Err(CredentialError::IndexOutOfRange { index, len });
    }
    Ok(())
}

/// Render a key for listings without revealing it: `sk-…wxyz`.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
