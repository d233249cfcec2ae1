use clap::{Parser, Subcommand};
use queuewatch_core::{ConfigError, MonitorConfig};
use queuewatch_monitor::MonitorError;
use queuewatch_observability::init_tracing;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod simulate;

use simulate::{OutputFormat, SimulateOptions};

#[derive(Parser, Debug)]
#[command(name = "queuewatch", version)]
#[command(about = "Queuewatch CLI - queue health monitoring tools")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a configuration file and print the effective configuration
    Validate {
        /// Path to a TOML configuration file
        path: PathBuf,
    },
    /// Monitor a fleet of simulated queues and print the resulting exposition
    Simulate {
        /// Number of simulated queues
        #[arg(long, default_value_t = 5)]
        queues: usize,
        /// Sampling passes to run
        #[arg(long, default_value_t = 10)]
        ticks: usize,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Optional TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Pause between passes in milliseconds
        #[arg(long, default_value_t = 0)]
        tick_delay_ms: u64,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Load a config file, apply `QUEUEWATCH_*` overrides and validate
fn load_config(path: Option<&Path>) -> Result<MonitorConfig, CliError> {
    let config = match path {
        Some(path) => MonitorConfig::load_from_file(path)?,
        None => MonitorConfig::default(),
    };
    let config = config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Validate { path } => {
            let config = load_config(Some(&path))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            tracing::info!(path = %path.display(), "Configuration is valid");
        }
        Commands::Simulate {
            queues,
            ticks,
            format,
            config,
            tick_delay_ms,
        } => {
            let config = load_config(config.as_deref())?;
            let output = simulate::run(
                config,
                SimulateOptions {
                    queues,
                    ticks,
                    format,
                    tick_delay: Duration::from_millis(tick_delay_ms),
                },
            )
            .await?;
            println!("{}", output);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.json_logs) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
