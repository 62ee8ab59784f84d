//! # deckhandctl
//!
//! Thin CLI over the Deckhand engine. Default-safe: every command is a
//! dry-run unless `--run` is passed. Console output stays minimal; the
//! detailed per-decision trail (why evicted, why fetched, why skipped)
//! goes to the structured log, tunable via `RUST_LOG`.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use deckhand_config::Settings;
use deckhand_core::cycle::CycleEngine;
use deckhand_core::execute::{ExecMode, MoveExecutor, RsyncTransfer, TransferTool};
use deckhand_core::fs::{FileSystem, RealFs};
use deckhand_core::gateway::{HttpGateway, MediaServerApi};
use deckhand_core::orphans::scan_orphans;
use deckhand_core::protect::SessionProtector;
use deckhand_core::state::StateStore;
use deckhand_model::CycleConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "deckhandctl",
    about = "Keeps on-deck media resident on the cache tier"
)]
struct Cli {
    /// Settings document produced by the setup wizard.
    #[arg(long, global = true, default_value = "deckhand_settings.json")]
    config: PathBuf,

    /// Verbose logging (RUST_LOG overrides this).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan one reconciliation cycle and print it.
    Cycle {
        /// Actually move files. Without this flag nothing is touched.
        #[arg(long)]
        run: bool,
    },
    /// Seed empty state files for a fresh install.
    Init {
        /// Replace existing state files.
        #[arg(long)]
        force: bool,
    },
    /// Validate the settings document and probe instance connectivity.
    Check,
    /// Find cache files the resident index does not know about.
    Orphans {
        /// Move the orphans back to the array.
        #[arg(long, conflicts_with = "adopt")]
        run: bool,
        /// Add the orphans to the resident index instead.
        #[arg(long)]
        adopt: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let settings = Settings::load(&cli.config)?;
    for warning in settings.validate()? {
        warn!("{} ({})", warning.message, warning.hint);
    }
    let config = Arc::new(settings.snapshot());

    match cli.command {
        Command::Cycle { run } => cmd_cycle(config, run).await,
        Command::Init { force } => cmd_init(&config, force),
        Command::Check => cmd_check(&config).await,
        Command::Orphans { run, adopt } => cmd_orphans(config, run, adopt).await,
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "deckhand=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn cmd_cycle(config: Arc<CycleConfig>, run: bool) -> Result<()> {
    let mode = if run { ExecMode::Apply } else { ExecMode::Report };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight operations");
                cancel.cancel();
            }
        });
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFs::new());
    let transfer: Arc<dyn TransferTool> = Arc::new(RsyncTransfer::new());
    let engine = CycleEngine::with_http_gateways(config, fs, transfer, cancel)?;
    let outcome = engine.run(mode).await?;

    println!(
        "{} evictions, {} fetches{}",
        outcome.plan.evictions.len(),
        outcome.plan.fetches.len(),
        if run { "" } else { " (dry-run; pass --run to apply)" }
    );
    if run {
        println!(
            "moved {} to array, {} to cache | skipped {} | failed {}",
            human(outcome.summary.bytes_to_array),
            human(outcome.summary.bytes_to_cache),
            outcome.summary.skipped,
            outcome.summary.failed,
        );
    }
    Ok(())
}

fn cmd_init(config: &CycleConfig, force: bool) -> Result<()> {
    let store = StateStore::new(config);
    store.init(force)?;
    println!("state seeded: {}", config.exclude_file.display());
    Ok(())
}

async fn cmd_check(config: &CycleConfig) -> Result<()> {
    let mut unreachable = 0usize;
    for instance in &config.instances {
        let gateway = HttpGateway::new(instance)?;
        match gateway.ping().await {
            Ok(()) => println!("{}: ok", instance.name),
            Err(err) => {
                unreachable += 1;
                println!("{}: unreachable ({err})", instance.name);
            }
        }
    }
    if unreachable > 0 {
        bail!("{unreachable} instance(s) unreachable");
    }
    Ok(())
}

async fn cmd_orphans(config: Arc<CycleConfig>, run: bool, adopt: bool) -> Result<()> {
    let store = StateStore::new(&config);
    let mut index = store.load()?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFs::new());

    let sweep = scan_orphans(&config, &fs, &index).await?;
    if sweep.orphans.is_empty() {
        println!("cache is clean");
        return Ok(());
    }
    println!(
        "{} orphaned files ({})",
        sweep.orphans.len(),
        human(sweep.total_bytes)
    );

    if adopt {
        sweep.adopt_into(&mut index);
        store.save(&index)?;
        println!("adopted into the resident index");
    } else if run {
        // Through the normal executor path, protection re-checks included.
        let mut gateways: Vec<Arc<dyn MediaServerApi>> = Vec::new();
        for instance in &config.instances {
            gateways.push(Arc::new(HttpGateway::new(instance)?));
        }
        let protector = Arc::new(SessionProtector::new(&config, gateways));
        let transfer: Arc<dyn TransferTool> = Arc::new(RsyncTransfer::new());
        let executor = MoveExecutor::new(
            config.clone(),
            fs,
            transfer,
            protector,
            CancellationToken::new(),
        );
        let summary = executor
            .run(&sweep.eviction_plan(), &mut index, &store, ExecMode::Apply)
            .await?;
        println!(
            "evicted {} ({}) | skipped {} | failed {}",
            summary.evicted,
            human(summary.bytes_to_array),
            summary.skipped,
            summary.failed,
        );
    } else {
        for orphan in &sweep.orphans {
            println!("[orphan] {}", orphan.display());
        }
        println!("pass --run to move them to the array, or --adopt to keep them");
    }
    Ok(())
}

fn human(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
