//! Lodestar command-line interface
//!
//! Submits service intent, runs reconciliation passes and plans, syncs
//! device state and inspects store history. Devices are simulated as JSON
//! files under the configured devices root.
//!
//! Exit status: 0 on success, 2 for client errors (malformed intent,
//! unknown service or device), 1 for server errors and partial failures.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lodestar_core::{DeviceError, ErrorClass, LodestarError, StoreError, ValidationError};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod commands;
mod config;
mod context;

use commands::{
    history::handle_history,
    reconcile::{handle_plan, handle_reconcile, PassArgs},
    service::{handle_service_command, ServiceCommand},
    sync::{handle_sync, handle_watch},
};
use config::LodestarConfig;
use context::CliContext;

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "Lodestar - declarative port intent reconciler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".lodestar/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage service documents
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Push desired state to devices
    Reconcile(PassArgs),

    /// Show what a reconcile would push without touching devices
    Plan(PassArgs),

    /// Read devices into the actual generation and report drift
    Sync {
        /// Devices to read; none means every indexed device
        devices: Vec<String>,
    },

    /// Periodically sync every device until interrupted
    Watch {
        /// Seconds between rounds, overriding the config
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List the revisions of a store path
    History {
        /// Store path, e.g. /Devices/cassini1/applied.json
        path: String,

        /// Print the content of this revision instead
        #[arg(long)]
        seq: Option<u64>,
    },
}

fn exit_code(class: Option<ErrorClass>) -> ExitCode {
    match class {
        None => ExitCode::SUCCESS,
        Some(ErrorClass::Client) => ExitCode::from(2),
        Some(ErrorClass::Server) => ExitCode::from(1),
    }
}

/// Response class of an error that reached the binary edge
fn classify(err: &anyhow::Error) -> ErrorClass {
    if let Some(err) = err.downcast_ref::<LodestarError>() {
        return err.class();
    }
    if let Some(err) = err.downcast_ref::<DeviceError>() {
        return LodestarError::from(err.clone()).class();
    }
    if let Some(err) = err.downcast_ref::<StoreError>() {
        return LodestarError::from(err.clone()).class();
    }
    if err.downcast_ref::<ValidationError>().is_some()
        || err.downcast_ref::<toml::de::Error>().is_some()
    {
        return ErrorClass::Client;
    }
    ErrorClass::Server
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

async fn run(cli: Cli) -> Result<Option<ErrorClass>> {
    let config = LodestarConfig::load(&cli.config).await?;
    let ctx = CliContext::open(config).await?;

    match cli.command {
        Commands::Service(cmd) => {
            handle_service_command(cmd, &ctx).await?;
            Ok(None)
        }
        Commands::Reconcile(args) => handle_reconcile(args, &ctx, &cancel_on_ctrl_c()).await,
        Commands::Plan(args) => handle_plan(args, &ctx).await,
        Commands::Sync { devices } => handle_sync(devices, &ctx).await,
        Commands::Watch { interval } => handle_watch(interval, &ctx, cancel_on_ctrl_c()).await,
        Commands::History { path, seq } => {
            handle_history(path, seq, &ctx).await?;
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(class) => exit_code(class),
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(Some(classify(&err)))
        }
    }
}
