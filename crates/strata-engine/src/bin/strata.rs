//! `strata` — run the warehouse pipeline over one source file.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! SQLite warehouse, and runs all five stages for one batch. The source
//! file is a JSON array of transaction rows:
//!
//! ```json
//! [{"invoice": "536365", "stock_code": "85123A", "description": "...",
//!   "quantity": "6", "invoice_date": "2010-12-01 08:26",
//!   "unit_price": "2.55", "customer_id": "17850",
//!   "country": "United Kingdom"}]
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use strata_core::{fact::MergeMode, raw::RawRow};
use strata_engine::{Engine, EngineConfig};
use strata_store_sqlite::SqliteWarehouse;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Strata retail warehouse pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// JSON source file to ingest.
  #[arg(short, long)]
  source: PathBuf,

  /// Batch identifier; defaults to a timestamp-derived id.
  #[arg(long)]
  batch_id: Option<String>,

  /// Reprocess the whole cleaned view instead of merging incrementally.
  #[arg(long)]
  full_refresh: bool,

  /// Effective date for dimension versions opened by this run
  /// (default: today, UTC).
  #[arg(long)]
  as_of: Option<NaiveDate>,

  /// How many recent batches to list after the run.
  #[arg(long, default_value_t = 5)]
  history: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("STRATA"))
    .build()
    .context("failed to read config file")?;
  let engine_cfg: EngineConfig = settings
    .try_deserialize()
    .context("failed to deserialise EngineConfig")?;

  let raw = std::fs::read_to_string(&cli.source)
    .with_context(|| format!("reading source file {}", cli.source.display()))?;
  let rows: Vec<RawRow> =
    serde_json::from_str(&raw).context("parsing source file")?;

  let source_file = cli.source.display().to_string();
  let batch_id = cli
    .batch_id
    .unwrap_or_else(|| format!("BATCH_{}", Utc::now().format("%Y%m%d%H%M%S")));
  let mode = if cli.full_refresh {
    MergeMode::FullRefresh
  } else {
    MergeMode::Incremental
  };
  let as_of = cli.as_of.unwrap_or_else(|| Utc::now().date_naive());

  let store = SqliteWarehouse::open(&engine_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open warehouse at {:?}", engine_cfg.store_path)
    })?;
  let engine = Engine::new(std::sync::Arc::new(store.clone()), engine_cfg);

  let report = engine
    .run_pipeline(&batch_id, &source_file, rows, mode, as_of)
    .await
    .with_context(|| format!("pipeline failed for batch {batch_id}"))?;

  tracing::info!(
    batch_id,
    ingested = report.ingest.inserted,
    duplicates = report.ingest.duplicates,
    cleaned = report.cleanse.kept,
    cleaning_rejects = report.cleanse.rejected_total(),
    facts_inserted = report.merged,
    facts_updated = report.updated,
    facts_rejected = report.rejected,
    overall_quality = report.quality.dimensional.overall,
    "pipeline complete"
  );

  use strata_core::store::WarehouseStore as _;
  for batch in store.list_batches(cli.history).await? {
    tracing::info!(
      batch_id = batch.batch_id,
      status = batch.status.as_str(),
      processed = batch.records_processed,
      inserted = batch.records_inserted,
      failed = batch.records_failed,
      "batch history"
    );
  }

  Ok(())
}
