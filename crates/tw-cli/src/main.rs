//! tunnel-watchdog CLI
//!
//! Keeps an SSH tunnel to a remote compute node alive and records it in the
//! user's SSH config so `ssh <cluster-id>` just works.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunnel_watchdog::commands;
use tw_core::ClusterId;

#[derive(Parser)]
#[command(name = "tunnel-watchdog")]
#[command(author, version, about = "Self-healing SSH tunnel to a remote compute node")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TUNNEL_WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Run in foreground with debug logging
    #[arg(short, long, global = true)]
    foreground: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a cluster's tunnel healthy until interrupted
    Watch {
        /// Cluster to tunnel to
        #[arg(long)]
        cluster_id: String,
    },

    /// Show the recorded tunnel for a cluster
    Show {
        /// Cluster to look up
        #[arg(long)]
        cluster_id: String,
    },

    /// Remove a cluster's registry entry and private key
    Forget {
        /// Cluster to forget
        #[arg(long)]
        cluster_id: String,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.foreground {
        "debug"
    } else {
        cli.log_level.as_str()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => commands::config_init(config_path, force),
        Commands::Watch { cluster_id } => {
            let config = commands::load_or_default(config_path)?;
            commands::watch(&config, ClusterId::new(cluster_id)).await
        }
        Commands::Show { cluster_id } => {
            let config = commands::load_or_default(config_path)?;
            commands::show(&config, &ClusterId::new(cluster_id))
        }
        Commands::Forget { cluster_id } => {
            let config = commands::load_or_default(config_path)?;
            commands::forget(&config, &ClusterId::new(cluster_id))
        }
    }
}
