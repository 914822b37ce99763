use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cardshift::config::CardshiftConfig;
use cardshift::telemetry::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "cardshift")]
#[command(version, about = "Optimistic card moves for Kanban boards")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to cardshift.toml. Defaults to .cardshift/cardshift.toml in the project directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Move a card on the board server
    Move {
        /// Card to move
        #[arg(long)]
        card: i64,

        /// Column the card is in now
        #[arg(long)]
        from: String,

        /// Target column (defaults to --from)
        #[arg(long)]
        to: Option<String>,

        /// Zero-based target index in the target column
        #[arg(long)]
        position: usize,

        /// Board server URL. Overrides cardshift.toml and CARDSHIFT_BASE_URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Project whose board holds the card
        #[arg(long)]
        project_id: Option<i64>,
    },
    /// Replay a scripted burst of moves against an in-memory board
    Simulate {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Override the debounce delay from config and scenario
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default cardshift.toml file
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(format, if cli.verbose { "info" } else { "warn" });

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| CardshiftConfig::default_path(&project_dir));

    match &cli.command {
        Commands::Move {
            card,
            from,
            to,
            position,
            base_url,
            project_id,
        } => {
            let mut config = CardshiftConfig::load_or_default(&config_path)?;
            if let Some(url) = base_url {
                config.server.base_url = url.clone();
            }
            if let Some(id) = project_id {
                config.server.project_id = *id;
            }
            let to = to.as_deref().unwrap_or(from);
            cmd::cmd_move(&config, *card, from, to, *position).await?;
        }
        Commands::Simulate {
            scenario,
            debounce_ms,
        } => {
            let config = CardshiftConfig::load_or_default(&config_path)?;
            cmd::cmd_simulate(config, scenario, *debounce_ms).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&config_path, command.clone())?,
    }

    Ok(())
}
