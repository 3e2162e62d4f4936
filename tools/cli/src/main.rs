//! DiskMirror CLI - one-way mirror of a local folder to Yandex Disk.
//!
//! Configuration comes from the environment, optionally seeded from a
//! `.env` file. See `diskmirror_sync::config::vars` for the variable names.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use diskmirror_storage::{DiskProvider, EntryKind, RemoteStorage};
use diskmirror_sync::{ReconcileStrategy, ReconciliationEngine, SyncConfig, SyncScheduler};

#[derive(Parser)]
#[command(name = "diskmirror")]
#[command(about = "DiskMirror - Mirror a local folder to Yandex Disk")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Load variables from this file instead of `./.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, then watch the folder until interrupted.
    Run {
        /// Skip the initial reconciliation.
        #[arg(long)]
        no_reconcile: bool,
    },

    /// Reconcile once and exit.
    Reconcile {
        /// Strategy: "wipe" or "diff" (default: from the environment).
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// List the remote folder.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env_file(cli.env_file.as_deref())?;
    let config = SyncConfig::from_vars(|name| std::env::var(name).ok())
        .context("Invalid configuration")?;

    init_logging(cli.verbose, config.log_file.as_deref())?;

    match cli.command {
        Commands::Run { no_reconcile } => cmd_run(config, no_reconcile).await,
        Commands::Reconcile { strategy } => cmd_reconcile(config, strategy.as_deref()).await,
        Commands::Info => cmd_info(config).await,
    }
}

fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
        }
        None => {
            // A missing ./.env is fine; the environment may be set already.
            if let Err(e) = dotenvy::dotenv() {
                if !e.not_found() {
                    return Err(e).context("Failed to load .env");
                }
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log filter")?;

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()
        .context("Failed to install logger")?;
    Ok(())
}

fn provider(config: &SyncConfig) -> Result<Arc<DiskProvider>> {
    let provider =
        DiskProvider::new(config.disk_config()).context("Failed to create Yandex Disk client")?;
    Ok(Arc::new(provider))
}

/// Watch the folder until Ctrl-C.
async fn cmd_run(mut config: SyncConfig, no_reconcile: bool) -> Result<()> {
    if no_reconcile {
        config.reconcile_on_start = false;
    }
    info!(
        "Mirroring {} to {}",
        config.sync_folder.display(),
        config.cloud_folder
    );

    let storage = provider(&config)?;
    let (scheduler, handle) = SyncScheduler::new(Arc::new(config), storage);

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        shutdown.cancel();
    });

    handle.run().await.context("Sync failed")?;
    Ok(())
}

/// Reconcile once.
async fn cmd_reconcile(config: SyncConfig, strategy: Option<&str>) -> Result<()> {
    let strategy = match strategy {
        Some(s) => s.parse::<ReconcileStrategy>().context("Invalid strategy")?,
        None => config.reconcile_strategy,
    };

    let storage = provider(&config)?;
    let engine = ReconciliationEngine::new(storage, &config).with_strategy(strategy);
    let report = engine
        .synchronize_initial(&config.sync_folder)
        .await
        .context("Reconciliation failed")?;

    println!("Reconciliation finished ({:?}):", strategy);
    println!("  Deleted:  {}", report.deleted);
    println!("  Uploaded: {}", report.uploaded);
    println!("  Failed:   {}", report.failed);
    println!("  Took:     {:.2?}", report.duration);

    if report.failed > 0 {
        anyhow::bail!("{} item(s) failed", report.failed);
    }
    Ok(())
}

/// List the remote folder.
async fn cmd_info(config: SyncConfig) -> Result<()> {
    let storage = provider(&config)?;
    let response = storage
        .get_info(&config.cloud_folder)
        .await
        .context("Failed to list remote folder")?;

    println!("{} ({} entries):", config.cloud_folder, response.body.len());
    for entry in &response.body {
        let marker = match entry.kind {
            EntryKind::Dir => "/",
            EntryKind::File => "",
        };
        let size = entry
            .size
            .map(|s| format!("{} bytes", s))
            .unwrap_or_default();
        let label = format!("{}{}", entry.name, marker);
        println!("  {:<40} {}", label, size);
    }

    Ok(())
}
