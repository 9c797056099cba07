use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::openai::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::models::MAX_ATTEMPTS;
use crate::repl::DEFAULT_QUIT_TOKEN;

/// Top-level configuration loaded from `helper.yaml`.
///
/// Every field has a default, so a missing file is equivalent to an
/// empty one.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Flat `KEY=value` file holding API keys and the system message.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// JSON transcript written on exit, interrupt, and leaving a chat.
    #[serde(default = "default_transcript_file")]
    pub transcript_file: PathBuf,
    /// Model name sent to the chat completions API.
    #[serde(default = "default_model")]
    pub model: String,
    /// Chat completions URL (any OpenAI-compatible server works).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Chat input that returns to the menu.
    #[serde(default = "default_quit_token")]
    pub quit_token: String,
    /// Attempts per agent turn before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_transcript_file() -> PathBuf {
    PathBuf::from("chatlog.json")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_quit_token() -> String {
    DEFAULT_QUIT_TOKEN.to_string()
}

fn default_max_retries() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            transcript_file: default_transcript_file(),
            model: default_model(),
            endpoint: default_endpoint(),
            quit_token: default_quit_token(),
            max_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file.  A missing file yields
    /// the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml_ng::from_str(&contents).context("failed to parse config YAML")?
        };
        config.validate()?;

        tracing::debug!(path = %path.display(), model = %config.model, "configuration loaded");
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.quit_token.trim().is_empty() {
            anyhow::bail!("config: quit_token must not be empty");
        }
        if self.quit_token.trim() != self.quit_token {
            anyhow::bail!("config: quit_token must not have surrounding whitespace");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("config: model must not be empty");
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            anyhow::bail!("config: endpoint must be an http(s) URL: {}", self.endpoint);
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.max_retries) {
            anyhow::bail!("config: max_retries must be between 1 and {MAX_ATTEMPTS}");
        }
        Ok(())
    }

    /// Apply `HELPER_MODEL` / `HELPER_ENDPOINT` overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("HELPER_MODEL").ok(),
            std::env::var("HELPER_ENDPOINT").ok(),
        );
    }

    /// Override model and endpoint when values are given and non-empty.
    pub fn apply_overrides(&mut self, model: Option<String>, endpoint: Option<String>) {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.endpoint = endpoint;
        }
    }

    /// Make relative file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.env_file.is_relative() {
            self.env_file = base.join(&self.env_file);
        }
        if self.transcript_file.is_relative() {
            self.transcript_file = base.join(&self.transcript_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_skip_empty_values() {
        let mut cfg = Config::default();
        cfg.apply_overrides(Some("gpt-4o".into()), Some(" ".into()));
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let mut cfg = Config {
            env_file: PathBuf::from("/etc/helper.env"),
            ..Config::default()
        };
        cfg.resolve_paths(Path::new("/work"));
        assert_eq!(cfg.env_file, PathBuf::from("/etc/helper.env"));
        assert_eq!(cfg.transcript_file, PathBuf::from("/work/chatlog.json"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_token = Config {
            quit_token: " ".into(),
            ..Config::default()
        };
        assert!(bad_token.validate().is_err());

        let bad_endpoint = Config {
            endpoint: "api.openai.com".into(),
            ..Config::default()
        };
        assert!(bad_endpoint.validate().is_err());

        let zero_retries = Config {
            max_retries: 0,
            ..Config::default()
        };
        assert!(zero_retries.validate().is_err());

        let endless_retries = Config {
            max_retries: 40,
            ..Config::default()
        };
        assert!(endless_retries.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
