use interp_helper::cli;
use interp_helper::config::Config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "interp-helper",
    version,
    about = "Chat with an OpenAI-backed agent; keeps keys, system message and transcript on disk"
)]
struct Cli {
    /// Path to configuration file (default: <dir>/helper.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the env file and transcript (default: $HELPER_HOME or .)
    #[arg(short = 'C', long)]
    dir: Option<PathBuf>,

    /// Env file with API keys and the system message
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Transcript file
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Model name (overrides config and HELPER_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Chat completions endpoint (overrides config and HELPER_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the interactive menu (default)
    Chat {
        /// Use the N-th stored key (1-based) instead of showing the key menu
        #[arg(long)]
        key_index: Option<usize>,
    },
    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Show or change the system message
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
    /// Inspect the saved transcript
    Transcript {
        #[command(subcommand)]
        action: TranscriptAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// List stored keys (masked)
    List,
    /// Append a key (prompted securely when omitted)
    Add { key: Option<String> },
    /// Remove the N-th key (1-based)
    Remove { number: usize },
    /// Replace the N-th key (1-based)
    Edit { number: usize, key: Option<String> },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Print the current system message
    Show,
    /// Replace the system message
    Set { message: String },
    /// Append text to the system message
    Append { text: String },
}

#[derive(Subcommand, Debug)]
enum TranscriptAction {
    /// Print the saved conversation
    Show {
        /// Only the final turn
        #[arg(long)]
        last: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with prompts on stdout.
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let cli = Cli::parse();
    let dir = cli.dir.clone().unwrap_or_else(interp_helper::helper_home);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| dir.join("helper.yaml"));

    info!(path = %config_path.display(), "loading configuration");
    let mut cfg = Config::load(&config_path).await?;
    cfg.apply_env();
    cfg.apply_overrides(cli.model, cli.endpoint);
    if let Some(env_file) = cli.env_file {
        cfg.env_file = env_file;
    }
    if let Some(transcript) = cli.transcript {
        cfg.transcript_file = transcript;
    }
    cfg.resolve_paths(&dir);
    cfg.validate()?;

    match cli.command.unwrap_or(Command::Chat { key_index: None }) {
        Command::Chat { key_index } => {
            cli::run_session(&cfg, key_index).await?;
            // The tokio stdin reader thread may still be blocked on a read
            // that cannot be cancelled; exit instead of waiting for it.
            std::process::exit(0);
        }
        Command::Keys { action } => match action {
            KeysAction::List => cli::keys_list(&cfg),
            KeysAction::Add { key } => cli::keys_add(&cfg, key),
            KeysAction::Remove { number } => cli::keys_remove(&cfg, number),
            KeysAction::Edit { number, key } => cli::keys_edit(&cfg, number, key),
        },
        Command::System { action } => match action {
            SystemAction::Show => cli::system_show(&cfg),
            SystemAction::Set { message } => cli::system_set(&cfg, &message),
            SystemAction::Append { text } => cli::system_append(&cfg, &text),
        },
        Command::Transcript { action } => match action {
            TranscriptAction::Show { last } => cli::transcript_show(&cfg, last).await,
        },
    }
}
