//! The conversational agent behind the session loop.
//!
//! [`Agent`] is the seam the loop talks to: chat, reset, bulk-load a prior
//! transcript, and a mutable system message.  [`ChatAgent`] implements it
//! on top of any [`ModelProvider`], keeping the conversation in memory and
//! sending the whole history on every turn.

use async_trait::async_trait;
use tracing::debug;

use crate::models::{ChatMessage, ModelProvider};
use crate::session::Turn;

#[async_trait]
pub trait Agent: Send {
    /// Send one line of user input; returns the turns it produced
    /// (the user turn followed by the reply).
    async fn chat(&mut self, input: &str) -> anyhow::Result<Vec<Turn>>;

    /// Forget the conversation so far.
    fn reset(&mut self);

    /// Replace the conversation with a previously saved transcript.
    fn load(&mut self, transcript: &[Turn]);

    fn system_message(&self) -> &str;

    fn set_system_message(&mut self, message: String);
}

/// [`Agent`] backed by a chat-completions provider.
pub struct ChatAgent<P> {
    provider: P,
    system_message: String,
    history: Vec<Turn>,
}

impl<P: ModelProvider> ChatAgent<P> {
    pub fn new(provider: P, system_message: impl Into<String>) -> Self {
        Self {
            provider,
            system_message: system_message.into(),
            history: Vec::new(),
        }
    }

    /// The turns the agent currently remembers.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Messages for the next request: system message first (when set),
    /// then the history.  Stored `system` turns are skipped so the current
    /// system message is the only one sent.
    fn request_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if !self.system_message.trim().is_empty() {
            messages.push(ChatMessage::new("system", self.system_message.clone()));
        }
        messages.extend(
            self.history
                .iter()
                .filter(|t| t.role != "system")
                .map(|t| ChatMessage::new(t.role.clone(), t.content.clone())),
        );
        messages
    }
}

#[async_trait]
impl<P: ModelProvider> Agent for ChatAgent<P> {
    async fn chat(&mut self, input: &str) -> anyhow::Result<Vec<Turn>> {
        let user = Turn::user(input);
        self.history.push(user.clone());

        let messages = self.request_messages();
        let reply = match self.provider.send_chat(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                // Failed turns are not part of the conversation.
                self.history.pop();
                return Err(e);
            }
        };

        let assistant = Turn::assistant(reply);
        self.history.push(assistant.clone());
        debug!(history = self.history.len(), "agent turn complete");
        Ok(vec![user, assistant])
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn load(&mut self, transcript: &[Turn]) {
        self.history = transcript.to_vec();
    }

    fn system_message(&self) -> &str {
        &self.system_message
    }

    fn set_system_message(&mut self, message: String) {
        self.system_message = message;
    }
}
