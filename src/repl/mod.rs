//! The interactive session loop.
//!
//! A numbered menu dispatches to a chat sub-loop, transcript restore, or
//! system-message editing.  [`Session::run_until`] races the whole loop
//! against an interrupt future; whichever way the loop ends, the
//! accumulated transcript is written before returning.

use std::future::Future;

use tracing::{info, warn};

use crate::agent::Agent;
use crate::console::Console;
use crate::session::{TranscriptStore, Turn};
use crate::system_message::SystemMessageStore;
use crate::utils::truncate_str;

/// Input that leaves the chat sub-loop unless configured otherwise.
pub const DEFAULT_QUIT_TOKEN: &str = "exit";

const MENU: &str = "\n--- Menu ---\n\
1. Start a new conversation\n\
2. Restore the previous conversation\n\
3. Edit the system message\n\
4. Exit";

/// A parsed top-level menu selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    NewConversation,
    Restore,
    EditSystemMessage,
    Exit,
}

impl MenuChoice {
    /// Parse the user's menu input; `None` for anything not on the menu.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().parse::<u32>().ok()? {
            1 => Some(Self::NewConversation),
            2 => Some(Self::Restore),
            3 => Some(Self::EditSystemMessage),
            4 => Some(Self::Exit),
            _ => None,
        }
    }
}

/// How [`Session::run_until`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The user chose exit or closed the input.
    Exited,
    /// The interrupt future completed first.
    Interrupted,
}

pub struct Session<A> {
    agent: A,
    transcripts: TranscriptStore,
    system_messages: SystemMessageStore,
    quit_token: String,
    transcript: Vec<Turn>,
    /// Set when `transcript` differs from what was last loaded or saved.
    dirty: bool,
}

impl<A: Agent> Session<A> {
    pub fn new(
        agent: A,
        transcripts: TranscriptStore,
        system_messages: SystemMessageStore,
    ) -> Self {
        Self {
            agent,
            transcripts,
            system_messages,
            quit_token: DEFAULT_QUIT_TOKEN.to_string(),
            transcript: Vec::new(),
            dirty: false,
        }
    }

    pub fn with_quit_token(mut self, token: impl Into<String>) -> Self {
        self.quit_token = token.into();
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// The in-memory transcript of the current conversation.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Run the menu loop until the user exits or `interrupt` resolves,
    /// then persist the transcript.
    pub async fn run_until<C, F>(&mut self, console: &mut C, interrupt: F) -> anyhow::Result<Outcome>
    where
        C: Console,
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            res = self.menu_loop(console) => res.map(|()| Outcome::Exited),
            () = interrupt => Ok(Outcome::Interrupted),
        };

        if matches!(result, Ok(Outcome::Interrupted)) {
            console.say("\nInterrupted. Saving the conversation.");
            info!(turns = self.transcript.len(), "interrupted, saving transcript");
        }
        self.save().await?;
        result
    }

    /// Write the transcript if it changed since the last load or save.
    pub async fn save(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.transcripts.save(&self.transcript).await?;
        self.dirty = false;
        Ok(())
    }

    async fn menu_loop<C: Console>(&mut self, console: &mut C) -> anyhow::Result<()> {
        loop {
            console.say(MENU);
            let Some(line) = console.read_line("Choose an option: ").await? else {
                return Ok(());
            };

            match MenuChoice::parse(&line) {
                Some(MenuChoice::NewConversation) => {
                    self.agent.reset();
                    self.transcript.clear();
                    info!("new conversation");
                    self.chat(console).await?;
                }
                Some(MenuChoice::Restore) => {
                    self.restore(console).await?;
                    self.chat(console).await?;
                }
                Some(MenuChoice::EditSystemMessage) => self.edit_system_message(console).await?,
                Some(MenuChoice::Exit) => return Ok(()),
                None => console.say("Please enter a number from 1 to 4."),
            }
        }
    }

    async fn restore<C: Console>(&mut self, console: &mut C) -> anyhow::Result<()> {
        let previous = match self.transcripts.load().await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "cannot restore transcript");
                console.say(&format!(
                    "Could not read the previous conversation ({e:#}). Starting a new one."
                ));
                Vec::new()
            }
        };
        if previous.is_empty() {
            console.say("There is no previous conversation. Starting a new one.");
            self.agent.reset();
            self.transcript.clear();
            return Ok(());
        }

        self.agent.load(&previous);
        console.say(&format!("Restored {} turn(s).", previous.len()));
        if let Some(last) = previous.last() {
            console.say(&format!("[{}] {}", last.role, truncate_str(&last.content, 500)));
        }
        info!(turns = previous.len(), "conversation restored");
        self.transcript = previous;
        self.dirty = false;
        Ok(())
    }

    async fn chat<C: Console>(&mut self, console: &mut C) -> anyhow::Result<()> {
        console.say(&format!(
            "Type '{}' to return to the menu.",
            self.quit_token
        ));

        while let Some(line) = console.read_line("> ").await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == self.quit_token {
                break;
            }

            match self.agent.chat(&line).await {
                Ok(turns) => {
                    for turn in turns.iter().filter(|t| t.role != "user") {
                        console.say(&turn.content);
                    }
                    self.transcript.extend(turns);
                    self.dirty = true;
                }
                Err(e) => {
                    warn!(error = %e, "agent turn failed");
                    console.say(&format!("Agent error: {e:#}"));
                }
            }
        }

        self.save().await
    }

    async fn edit_system_message<C: Console>(&mut self, console: &mut C) -> anyhow::Result<()> {
        let current = self.agent.system_message();
        console.say("Current system message:");
        console.say(if current.is_empty() { "(empty)" } else { current });

        let Some(mode) = console.read_line("1. Replace  2. Append  [1]: ").await? else {
            return Ok(());
        };
        let append = match mode.trim() {
            "" | "1" => false,
            "2" => true,
            _ => {
                console.say("Unknown choice; system message unchanged.");
                return Ok(());
            }
        };

        let Some(text) = console.read_line("New text: ").await? else {
            return Ok(());
        };
        if text.trim().is_empty() {
            console.say("System message unchanged.");
            return Ok(());
        }

        let updated = if append {
            self.system_messages.append(&text)?
        } else {
            self.system_messages.replace(&text)?;
            text
        };
        self.agent.set_system_message(updated);
        console.say("System message saved.");
        Ok(())
    }
}
