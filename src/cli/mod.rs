//! CLI subcommand handlers extracted from `main.rs`.
//!
//! Keeps `main.rs` slim: clap parsing stays there, heavy logic lives here.

use std::io::IsTerminal;

use anyhow::Context;
use tracing::{info, warn};

use crate::agent::ChatAgent;
use crate::config::Config;
use crate::console::StdConsole;
use crate::credentials::{mask_key, CredentialError, CredentialStore};
use crate::models::{OpenAIProvider, ProviderManager};
use crate::repl::Session;
use crate::session::TranscriptStore;
use crate::system_message::SystemMessageStore;

// ── Key menu ─────────────────────────────────────────────────────────────────

/// One entry of the interactive key menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMenuAction {
    /// Use the key at this zero-based index.
    Use(usize),
    Add,
    Delete,
    Edit,
    Done,
}

impl KeyMenuAction {
    /// Map a selected menu row to its action.  Rows are the keys in order,
    /// followed by add / delete / edit / done.
    pub fn from_row(row: usize, key_count: usize) -> Option<Self> {
        if row < key_count {
            return Some(Self::Use(row));
        }
        match row - key_count {
            0 => Some(Self::Add),
            1 => Some(Self::Delete),
            2 => Some(Self::Edit),
            3 => Some(Self::Done),
            _ => None,
        }
    }
}

fn require_tty(what: &str) -> anyhow::Result<()> {
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("{what} requires an interactive terminal (use `keys add` to store a key)");
    }
    Ok(())
}

fn prompt_secret(prompt: &str) -> anyhow::Result<String> {
    dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .context("failed to read API key")
}

fn pick_row(prompt: &str, keys: &[String]) -> anyhow::Result<usize> {
    let items: Vec<String> = keys.iter().map(|k| mask_key(k)).collect();
    dialoguer::Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(0)
        .interact()
        .context("selection cancelled")
}

/// Return the stored keys, prompting for a first key when none exist.
pub fn load_or_prompt_keys(store: &CredentialStore) -> anyhow::Result<Vec<String>> {
    let keys = store.load()?;
    if !keys.is_empty() {
        return Ok(keys);
    }

    require_tty("entering an API key")?;
    println!(
        "No API key found in {}. Enter a new one.",
        store.path().display()
    );
    loop {
        let key = prompt_secret("OpenAI API key")?;
        match store.add(&key) {
            Ok(keys) => return Ok(keys),
            Err(CredentialError::Store(e)) => return Err(e),
            Err(e) => println!("  {e}"),
        }
    }
}

/// Interactive key menu: pick a key, or add / delete / edit stored keys.
///
/// Choosing *done* falls back to the first stored key.
pub fn select_api_key(store: &CredentialStore) -> anyhow::Result<String> {
    require_tty("the key menu")?;

    loop {
        let keys = store.load()?;
        let mut items: Vec<String> = keys.iter().map(|k| mask_key(k)).collect();
        items.extend(
            ["Add a key", "Delete a key", "Edit a key", "Done"]
                .iter()
                .map(|s| s.to_string()),
        );

        println!();
        let row = dialoguer::Select::new()
            .with_prompt("Available API keys")
            .items(&items)
            .default(0)
            .interact()
            .context("key selection cancelled")?;

        let result = match KeyMenuAction::from_row(row, keys.len()) {
            Some(KeyMenuAction::Use(i)) => return Ok(keys[i].clone()),
            Some(KeyMenuAction::Add) => {
                let key = prompt_secret("New API key")?;
                store.add(&key).map(|_| ())
            }
            Some(KeyMenuAction::Delete) if !keys.is_empty() => {
                let i = pick_row("Key to delete", &keys)?;
                store.delete(i).map(|_| ())
            }
            Some(KeyMenuAction::Edit) if !keys.is_empty() => {
                let i = pick_row("Key to edit", &keys)?;
                let key = prompt_secret("New value")?;
                store.edit(i, &key)
            }
            Some(KeyMenuAction::Done) | None => {
                return keys
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("no API key available"));
            }
            Some(_) => {
                println!("  No keys stored.");
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(CredentialError::Store(e)) => return Err(e),
            Err(e) => println!("  {e}"),
        }
    }
}

/// Resolve a 1-based `--key-index` against the stored keys.
pub fn key_by_number(keys: &[String], number: usize) -> Result<String, CredentialError> {
    number
        .checked_sub(1)
        .and_then(|i| keys.get(i))
        .cloned()
        .ok_or(CredentialError::IndexOutOfRange {
            index: number.saturating_sub(1),
            len: keys.len(),
        })
}

fn number_to_index(number: usize) -> anyhow::Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("key numbers start at 1"))
}

// ── Non-interactive key management ───────────────────────────────────────────

pub fn keys_list(cfg: &Config) -> anyhow::Result<()> {
    let keys = CredentialStore::new(&cfg.env_file).load()?;
    if keys.is_empty() {
        println!("No API keys stored in {}.", cfg.env_file.display());
        return Ok(());
    }
    for (i, key) in keys.iter().enumerate() {
        println!("{:>3}. {}", i + 1, mask_key(key));
    }
    Ok(())
}

pub fn keys_add(cfg: &Config, key: Option<String>) -> anyhow::Result<()> {
    let store = CredentialStore::new(&cfg.env_file);
    let key = match key {
        Some(k) => k,
        None => {
            require_tty("reading a key")?;
            prompt_secret("New API key")?
        }
    };
    let keys = store.add(&key)?;
    println!("Key added as #{}.", keys.len());
    Ok(())
}

pub fn keys_remove(cfg: &Config, number: usize) -> anyhow::Result<()> {
    let store = CredentialStore::new(&cfg.env_file);
    let removed = store.delete(number_to_index(number)?)?;
    println!("Removed key #{number} ({}).", mask_key(&removed));
    Ok(())
}

pub fn keys_edit(cfg: &Config, number: usize, key: Option<String>) -> anyhow::Result<()> {
    let store = CredentialStore::new(&cfg.env_file);
    let index = number_to_index(number)?;
    let key = match key {
        Some(k) => k,
        None => {
            require_tty("reading a key")?;
            prompt_secret("New value")?
        }
    };
    store.edit(index, &key)?;
    println!("Key #{number} updated.");
    Ok(())
}

// ── System message ───────────────────────────────────────────────────────────

pub fn system_show(cfg: &Config) -> anyhow::Result<()> {
    let message = SystemMessageStore::new(&cfg.env_file).load()?;
    if message.is_empty() {
        println!("(no system message)");
    } else {
        println!("{message}");
    }
    Ok(())
}

pub fn system_set(cfg: &Config, message: &str) -> anyhow::Result<()> {
    SystemMessageStore::new(&cfg.env_file).replace(message)?;
    println!("System message saved.");
    Ok(())
}

pub fn system_append(cfg: &Config, addition: &str) -> anyhow::Result<()> {
    let message = SystemMessageStore::new(&cfg.env_file).append(addition)?;
    println!("System message is now:\n{message}");
    Ok(())
}

// ── Transcript ───────────────────────────────────────────────────────────────

pub async fn transcript_show(cfg: &Config, last_only: bool) -> anyhow::Result<()> {
    let store = TranscriptStore::new(&cfg.transcript_file);
    let turns = if last_only {
        store.last_turn().await?
    } else {
        store.load().await?
    };
    if turns.is_empty() {
        println!("No saved conversation in {}.", cfg.transcript_file.display());
        return Ok(());
    }
    for turn in &turns {
        println!("[{}] {}", turn.role, turn.content);
    }
    Ok(())
}

// ── Interactive session ──────────────────────────────────────────────────────

/// Resolve the API key, build the agent, and run the menu loop until the
/// user exits or presses Ctrl-C.
pub async fn run_session(cfg: &Config, key_number: Option<usize>) -> anyhow::Result<()> {
    let credentials = CredentialStore::new(&cfg.env_file);
    let keys = load_or_prompt_keys(&credentials)?;
    let api_key = match key_number {
        Some(n) => key_by_number(&keys, n)?,
        None if keys.len() > 1 => select_api_key(&credentials)?,
        None => keys[0].clone(),
    };

    let provider = OpenAIProvider::with_config(api_key, cfg.endpoint.clone(), cfg.model.clone())?;
    let provider = ProviderManager::new(Box::new(provider), cfg.max_retries);

    let system_messages = SystemMessageStore::new(&cfg.env_file);
    let agent = ChatAgent::new(provider, system_messages.load()?);

    let mut session = Session::new(
        agent,
        TranscriptStore::new(&cfg.transcript_file),
        system_messages,
    )
    .with_quit_token(cfg.quit_token.clone());

    info!(model = %cfg.model, endpoint = %cfg.endpoint, "session starting");

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut console = StdConsole::new();
    let outcome = session.run_until(&mut console, interrupt).await?;
    info!(?outcome, turns = session.transcript().len(), "session finished");
    Ok(())
}
