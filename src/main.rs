use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ghg_recalc::{DatasetRole, EngineConfig, EventDirectory, RecalculationJob};

#[derive(Parser)]
#[command(name = "ghg-recalc")]
#[command(about = "Compare a baseline GHG inventory dataset against a comparator")]
#[command(version)]
struct Cli {
    /// Event directory holding metadata.json, baseline.json and comparator.json
    event_dir: PathBuf,

    /// Lookup tables (defaults to <event_dir>/lookups.json)
    #[arg(long)]
    lookups: Option<PathBuf>,

    /// Grouping column that never carries recalculated values (repeatable)
    #[arg(long = "filter-by")]
    filter_by: Vec<String>,

    /// Column hashed into the raw data key (repeatable)
    #[arg(long = "raw-key-column")]
    raw_key_columns: Vec<String>,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let event = EventDirectory::new(&cli.event_dir);
    let metadata = event.read_metadata().context("failed to read event metadata")?;
    let lookup = event
        .read_lookups(cli.lookups.as_deref())
        .context("failed to read lookup tables")?;
    let baseline = event
        .read_dataset(DatasetRole::Baseline)
        .context("failed to read baseline dataset")?;
    let comparator = event
        .read_dataset(DatasetRole::Comparator)
        .context("failed to read comparator dataset")?;

    let mut config = EngineConfig::new();
    if !cli.filter_by.is_empty() {
        config = config.with_filter_by_columns(cli.filter_by);
    }
    if !cli.raw_key_columns.is_empty() {
        config = config.with_raw_data_key_columns(cli.raw_key_columns);
    }

    let report = RecalculationJob::new(&metadata, &lookup)
        .with_config(config)
        .run(&baseline, &comparator)
        .context("recalculation failed")?;

    let (aggregate_path, raw_path) = event
        .write_results(&report)
        .context("failed to write results")?;
    info!(
        aggregate = %aggregate_path.display(),
        raw = %raw_path.display(),
        matches = report.raw_stats.matches,
        non_matches = report.raw_stats.non_matches,
        "recalculation complete"
    );
    Ok(())
}
