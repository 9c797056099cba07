//! Model provider abstractions.
//!
//! Defines the [`ModelProvider`] trait, the [`ChatMessage`] type,
//! [`ProviderManager`] for retry semantics, and the concrete
//! [`OpenAIProvider`].

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

pub use openai::OpenAIProvider;

// ---------------------------------------------------------------------------
// ChatMessage – shared message representation
// ---------------------------------------------------------------------------

/// A single chat message with a role and content.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Serialise a slice of [`ChatMessage`]s into the OpenAI-compatible
/// JSON array format.
pub fn serialize_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
        .collect()
}

// ---------------------------------------------------------------------------
// ModelProvider trait
// ---------------------------------------------------------------------------

/// Trait implemented by every LLM backend.
///
/// Each provider knows how to turn a list of chat messages into a
/// single assistant reply string.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a sequence of chat messages and return the assistant's reply.
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error>;
}

// ---------------------------------------------------------------------------
// ProviderManager – retry wrapper
// ---------------------------------------------------------------------------

/// Upper bound on attempts per call.
pub const MAX_ATTEMPTS: usize = 10;

/// Longest single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Wraps a provider with per-call retries and exponential backoff.
///
/// Implements [`ModelProvider`] itself so it can be used transparently
/// anywhere a single provider is expected.
pub struct ProviderManager {
    provider: Box<dyn ModelProvider>,
    max_retries: usize,
    base_delay: Duration,
}

impl ProviderManager {
    /// * `max_retries` – total attempts per call (clamped to `1..=MAX_ATTEMPTS`).
    pub fn new(provider: Box<dyn ModelProvider>, max_retries: usize) -> Self {
        Self {
            provider,
            max_retries: max_retries.clamp(1, MAX_ATTEMPTS),
            base_delay: Duration::from_millis(100),
        }
    }

    /// Override the first backoff delay (doubles after every attempt).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sleep before the attempt following failed attempt number `attempt`
    /// (1-based), capped at [`MAX_BACKOFF`].
    fn backoff(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(MAX_BACKOFF)
    }

    /// Send chat messages, retrying transient failures.
    ///
    /// Permanent errors (400, 401, 403, 404, 422) are returned immediately.
    pub async fn send_chat_with_retry(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, anyhow::Error> {
        let mut attempt = 0;
        loop {
            match self.provider.send_chat(messages).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    let permanent = is_permanent_error(&e);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = self.max_retries,
                        permanent,
                        error = %e,
                        "provider call failed"
                    );
                    if permanent || attempt >= self.max_retries {
                        return Err(e);
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
            }
        }
    }
}

/// Check if an error represents a permanent HTTP failure that should not
/// be retried (auth errors, bad request, not found).
///
/// Parses status codes from error messages like "OpenAI API returned 401 …"
pub fn is_permanent_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    ["400", "401", "403", "404", "422"]
        .iter()
        .any(|code| msg.contains(&format!("returned {code}")))
}

#[async_trait]
impl ModelProvider for ProviderManager {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error> {
        self.send_chat_with_retry(messages).await
    }
}
