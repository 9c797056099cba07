//! interp_helper: menu-driven helper around an OpenAI-backed chat agent.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod agent;
pub mod cli;
pub mod config;
pub mod console;
pub mod credentials;
pub mod envfile;
pub mod models;
pub mod repl;
pub mod session;
pub mod system_message;
pub mod utils;

/// Return the working directory the helper keeps its files in.
///
/// Resolution order:
/// 1. `HELPER_HOME` environment variable
/// 2. the current directory
pub fn helper_home() -> std::path::PathBuf {
    match std::env::var("HELPER_HOME") {
        Ok(p) if !p.is_empty() => std::path::PathBuf::from(p),
        _ => std::path::PathBuf::from("."),
    }
}
