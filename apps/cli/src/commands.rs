//! CLI argument parsing, tracing setup, and the single run command.
//!
//! refsync has no subcommands: a direct invocation executes one full batch
//! (pull → process → push). Startup failures (config, run context, storage)
//! exit non-zero; everything past startup is recorded and the process still
//! exits cleanly.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{info, warn};

use refsync_convert::{CommandExtractor, Converter};
use refsync_core::{Pipeline, PushSummary, SyncGateway};
use refsync_fetcher::Fetcher;
use refsync_shared::{AppConfig, load_config_from, validate_config};
use refsync_storage::{RunContext, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// refsync — collect referenced content into knowledge-base records.
#[derive(Parser)]
#[command(
    name = "refsync",
    version,
    about = "Collect referenced content into knowledge-base records and sync them upstream.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "refsync.toml")]
    pub config: PathBuf,

    /// Override the data directory from the config file.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing to the run's fresh log file.
fn init_tracing(ctx: &RunContext, debug_enabled: bool) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if debug_enabled { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let log_file = std::fs::File::create(&ctx.log_path)
        .wrap_err_with(|| format!("cannot create log file {}", ctx.log_path.display()))?;

    fmt()
        .with_env_filter(env_filter)
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute one full batch: pull, process every record, push dirty records.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Startup phase: failures here are fatal and exit non-zero.
    let config: AppConfig = load_config_from(&cli.config)
        .wrap_err_with(|| format!("cannot load config from {}", cli.config.display()))?;
    validate_config(&config)?;

    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&config.storage.data_dir));
    let ctx = RunContext::prepare(&data_dir)?;
    init_tracing(&ctx, config.debug.enabled)?;

    info!(
        data_dir = %ctx.data_dir.display(),
        started_at = %ctx.started_at,
        "run context ready"
    );

    let storage = Storage::open(&ctx.db_path).await?;
    let gateway = SyncGateway::new(&config.api)?;
    let fetcher = Fetcher::new()?;
    let converter = Converter::new(Box::new(CommandExtractor::new(
        config.converter.command.clone(),
    )));

    // Batch phase: failures are logged per record; the process exits 0.
    if let Err(e) = gateway.pull(&storage).await {
        warn!(error = %e, "record pull failed; continuing with local state");
    }

    let pipeline = Pipeline::new(&storage, &fetcher, &converter);
    let summary = pipeline.process_records().await?;

    let push = match gateway.push(&storage).await {
        Ok(push) => push,
        Err(e) => {
            warn!(error = %e, "record push failed");
            PushSummary::default()
        }
    };

    println!();
    println!("  Run complete");
    println!("  Processed: {}", summary.processed);
    println!("  Updated:   {}", summary.updated);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Pushed:    {} ({} failed)", push.pushed, push.failed);
    println!("  Log:       {}", ctx.log_path.display());
    println!();

    Ok(())
}
