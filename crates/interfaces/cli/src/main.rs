mod learning_cmds;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use homunculus_config::LearningConfig;

const DEFAULT_CONFIG_PATH: &str = "config/learning.toml";

#[derive(Debug, Parser)]
#[command(
    name = "homunculus",
    version,
    about = "Learns skill candidates and code-navigation instincts from tool-use observations"
)]
struct Cli {
    /// Learning config (TOML, or JSON when the file ends in `.json`).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan recent observations for skill-extraction candidates.
    Detect,
    /// Turn confirmed Grep → Read → Edit sequences into navigation instincts.
    Learn {
        /// Project recorded on new instincts (default: git top-level directory name).
        #[arg(long)]
        project: Option<String>,
    },
    /// Apply confidence decay to unused instincts.
    Decay,
    /// Delete instincts whose confidence fell below a threshold.
    Cleanup {
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Print instinct statistics as JSON.
    Stats,
    /// Append one observation, read as a JSON line from stdin.
    Observe,
}

fn init_tracing(fallback_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = LearningConfig::load_from(&cli.config)?;
    init_tracing(&config.telemetry.log_level);

    let now = Utc::now();
    match cli.command {
        Commands::Detect => learning_cmds::run_detect(&config, now)?,
        Commands::Learn { project } => learning_cmds::run_learn(&config, project)?,
        Commands::Decay => learning_cmds::run_decay(&config, now)?,
        Commands::Cleanup { threshold } => learning_cmds::run_cleanup(&config, threshold)?,
        Commands::Stats => learning_cmds::run_stats(&config)?,
        Commands::Observe => learning_cmds::run_observe(&config, now).await?,
    }

    Ok(())
}
