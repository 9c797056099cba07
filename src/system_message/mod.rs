//! Persisted agent system message.
//!
//! Stored under [`SYSTEM_MESSAGE_VAR`] in the env file.  `replace` is the
//! normal edit path; `append` concatenates onto the stored value, which is
//! how older installs grew their message one addition at a time.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::envfile;

/// Env-file variable holding the system message.
pub const SYSTEM_MESSAGE_VAR: &str = "INTERPRETER_SYSTEM_MESSAGE";

#[derive(Debug, Clone)]
pub struct SystemMessageStore {
    path: PathBuf,
}

impl SystemMessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored message, or `""` when none is set.
    pub fn load(&self) -> anyhow::Result<String> {
        Ok(envfile::get(&self.path, SYSTEM_MESSAGE_VAR)?.unwrap_or_default())
    }

    /// Overwrite the stored message.
    pub fn replace(&self, message: &str) -> anyhow::Result<()> {
        envfile::set(&self.path, SYSTEM_MESSAGE_VAR, message)?;
        info!(chars = message.chars().count(), "system message replaced");
        Ok(())
    }

    /// Append `addition` to the stored message and return the new value.
    pub fn append(&self, addition: &str) -> anyhow::Result<String> {
        let mut message = self.load()?;
        message.push_str(addition);
        envfile::set(&self.path, SYSTEM_MESSAGE_VAR, &message)?;
        info!(chars = message.chars().count(), "system message appended");
        Ok(message)
    }
}
