// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetd::config::DEFAULT_CONFIG_PATH;
use fleetd::{Daemon, FleetConfig, LoopbackTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(author, version, about = "Package rollout daemon with experiments and remote control", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon until interrupted
    Run,
    /// Install a package as the new stable version
    Install {
        /// Package URL
        url: String,
    },
    /// Start an experiment with a package
    StartExperiment {
        /// Package URL
        url: String,
    },
    /// Stop the running experiment of a package
    StopExperiment {
        /// Package name
        package: String,
    },
    /// Promote the running experiment of a package to stable
    PromoteExperiment {
        /// Package name
        package: String,
    },
    /// Print the installed state of every package as JSON
    State,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = FleetConfig::load(&cli.config)?;
    let transport = Arc::new(LoopbackTransport::new());
    let daemon = Daemon::from_config(&config, transport)
        .context("could not create daemon")?;

    match cli.command {
        Commands::Run => run(daemon).await,
        Commands::Install { url } => Ok(daemon.install(&url).await?),
        Commands::StartExperiment { url } => Ok(daemon.start_experiment(&url).await?),
        Commands::StopExperiment { package } => Ok(daemon.stop_experiment(&package).await?),
        Commands::PromoteExperiment { package } => {
            Ok(daemon.promote_experiment(&package).await?)
        }
        Commands::State => {
            let state = daemon.get_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
    }
}

async fn run(daemon: Daemon) -> Result<()> {
    info!("Starting fleetd version {}", env!("CARGO_PKG_VERSION"));
    daemon.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("could not listen for shutdown signal")?;
    info!("Received shutdown signal");

    daemon.stop().await?;
    Ok(())
}
