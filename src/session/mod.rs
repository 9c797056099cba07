//! Conversation transcripts: `Turn` records and the `TranscriptStore`
//! that persists them as one pretty-printed JSON array (`chatlog.json`).
//!
//! The in-memory transcript is append-only while a session runs; saving
//! always overwrites the whole file.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

// ── Turn ─────────────────────────────────────────────────────

/// One conversational unit.
///
/// Fields beyond `role` and `content` (written by other tools that share
/// the transcript file) are kept in `extra` so they survive a round trip.
/// A `null` content (function-call turns) reads as an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// `"user"`, `"assistant"` or `"system"`.
    pub role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Older chat logs keep the text under `"message"`; move it into
    /// `content` when `content` itself is empty.
    fn adopt_legacy_message(&mut self) {
        if !self.content.is_empty() {
            return;
        }
        if let Some(serde_json::Value::String(text)) = self.extra.remove("message") {
            self.content = text;
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ── TranscriptStore ──────────────────────────────────────────

/// Reads and writes a transcript file.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    path: PathBuf,
}

impl TranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `transcript`, pretty-printed.
    ///
    /// Non-ASCII text is written as-is rather than `\u` escaped.  The new
    /// contents land in a temp file first and are renamed into place.
    pub async fn save(&self, transcript: &[Turn]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(transcript).context("serialize transcript")?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || crate::utils::write_atomic(&path, &json))
            .await
            .context("transcript writer task failed")??;

        debug!(path = %self.path.display(), turns = transcript.len(), "transcript saved");
        Ok(())
    }

    /// Load the whole transcript.
    ///
    /// Returns an empty vec when the file does not exist or is blank.
    pub async fn load(&self) -> anyhow::Result<Vec<Turn>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut turns: Vec<Turn> = serde_json::from_str(&content)
            .with_context(|| format!("parse transcript {}", self.path.display()))?;
        turns.iter_mut().for_each(Turn::adopt_legacy_message);
        debug!(path = %self.path.display(), turns = turns.len(), "transcript loaded");
        Ok(turns)
    }

    /// The final turn of the stored transcript: zero or one element.
    pub async fn last_turn(&self) -> anyhow::Result<Vec<Turn>> {
        let mut turns = self.load().await?;
        Ok(turns.pop().into_iter().collect())
    }
}

// ── Tests ────────────────────────────────────────────────────
