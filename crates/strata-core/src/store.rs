//! The `WarehouseStore` trait — the persisted boundary between stages.
//!
//! Implemented by storage backends (e.g. `strata-store-sqlite`). The engine
//! depends on this abstraction, not on any concrete backend. All raw-tier
//! writes are append-only; dimension revisions are atomic close+insert pairs
//! so readers never observe zero or two current versions for a key.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
  calendar::DateRow,
  clean::CleanedTransaction,
  dimension::{CustomerAttributes, CustomerVersion, ProductAttributes, ProductVersion},
  fact::FactRow,
  quality::{QualityReport, WarehouseAudit},
  raw::{BatchClose, BatchStatus, IngestionBatch, RawRecord},
};

// ─── Outcome types ───────────────────────────────────────────────────────────

/// Result of appending a set of raw records: exact duplicates (by content
/// fingerprint) are skipped, not errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
  pub inserted:   u64,
  pub duplicates: u64,
}

/// Insert/update split from a fact upsert pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
  pub inserted: u64,
  pub updated:  u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Strata warehouse backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait WarehouseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Batch log ─────────────────────────────────────────────────────────

  /// Persist a fresh batch record (normally in the `Started` state).
  /// Re-using an existing batch id re-opens it as a new attempt; raw rows
  /// already landed under the id are untouched.
  fn begin_batch(
    &self,
    batch: IngestionBatch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Transition a batch, recording close counts and an error message for
  /// terminal transitions. Errors if the batch is unknown, already
  /// terminal, or the transition is not legal.
  fn transition_batch(
    &self,
    batch_id: String,
    status: BatchStatus,
    close: Option<BatchClose>,
    error_message: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_batch(
    &self,
    batch_id: String,
  ) -> impl Future<Output = Result<Option<IngestionBatch>, Self::Error>> + Send + '_;

  /// Most recent batches first.
  fn list_batches(
    &self,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<IngestionBatch>, Self::Error>> + Send + '_;

  // ── Raw tier (append-only) ────────────────────────────────────────────

  /// Append raw records, skipping content-hash duplicates. No row is ever
  /// modified after insertion; no deletion path exists.
  fn append_raw(
    &self,
    records: Vec<RawRecord>,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  fn raw_for_batch(
    &self,
    batch_id: String,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;

  fn raw_count(&self)
  -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Cleaned tier (recomputed view) ────────────────────────────────────

  /// Replace the cleaned view of one batch with `rows`, atomically. Rows
  /// the batch previously kept but no longer does are removed, so the view
  /// is a true recomputation rather than an upsert.
  fn replace_cleaned(
    &self,
    batch_id: String,
    rows: Vec<CleanedTransaction>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn cleaned_for_batch(
    &self,
    batch_id: String,
  ) -> impl Future<Output = Result<Vec<CleanedTransaction>, Self::Error>> + Send + '_;

  /// Cleaned rows with `load_timestamp` at or after the watermark
  /// (everything when `None`), ordered by load timestamp.
  fn cleaned_since(
    &self,
    watermark: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<CleanedTransaction>, Self::Error>> + Send + '_;

  // ── Product dimension (SCD2) ──────────────────────────────────────────

  fn current_product(
    &self,
    stock_code: String,
  ) -> impl Future<Output = Result<Option<ProductVersion>, Self::Error>> + Send + '_;

  fn current_products(
    &self,
  ) -> impl Future<Output = Result<Vec<ProductVersion>, Self::Error>> + Send + '_;

  /// Full version chain for one natural key, oldest first.
  fn product_versions(
    &self,
    stock_code: String,
  ) -> impl Future<Output = Result<Vec<ProductVersion>, Self::Error>> + Send + '_;

  /// Insert version 1 for a natural key never seen before.
  fn insert_product_version(
    &self,
    stock_code: String,
    attributes: ProductAttributes,
    as_of: NaiveDate,
  ) -> impl Future<Output = Result<ProductVersion, Self::Error>> + Send + '_;

  /// Close `prior` and insert its successor in one atomic operation; at no
  /// point does a reader observe zero or two current rows for the key.
  /// Errors with a stale-revision fault if `prior` is no longer current.
  fn revise_product(
    &self,
    prior: ProductVersion,
    attributes: ProductAttributes,
    as_of: NaiveDate,
  ) -> impl Future<Output = Result<ProductVersion, Self::Error>> + Send + '_;

  // ── Customer dimension (SCD2) ─────────────────────────────────────────

  fn current_customer(
    &self,
    customer_id: String,
  ) -> impl Future<Output = Result<Option<CustomerVersion>, Self::Error>> + Send + '_;

  fn current_customers(
    &self,
  ) -> impl Future<Output = Result<Vec<CustomerVersion>, Self::Error>> + Send + '_;

  fn customer_versions(
    &self,
    customer_id: String,
  ) -> impl Future<Output = Result<Vec<CustomerVersion>, Self::Error>> + Send + '_;

  fn insert_customer_version(
    &self,
    customer_id: String,
    attributes: CustomerAttributes,
    as_of: NaiveDate,
  ) -> impl Future<Output = Result<CustomerVersion, Self::Error>> + Send + '_;

  fn revise_customer(
    &self,
    prior: CustomerVersion,
    attributes: CustomerAttributes,
    as_of: NaiveDate,
  ) -> impl Future<Output = Result<CustomerVersion, Self::Error>> + Send + '_;

  // ── Calendar dimension ────────────────────────────────────────────────

  /// Insert calendar rows that do not exist yet; returns how many were
  /// added. The calendar is static once generated.
  fn ensure_calendar(
    &self,
    rows: Vec<DateRow>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Min and max date keys present, or `None` if the calendar is empty.
  /// The calendar is dense, so membership is a range check.
  fn calendar_bounds(
    &self,
  ) -> impl Future<Output = Result<Option<(i32, i32)>, Self::Error>> + Send + '_;

  // ── Fact tier ─────────────────────────────────────────────────────────

  /// Idempotent upsert keyed by the deterministic fact id.
  fn upsert_facts(
    &self,
    rows: Vec<FactRow>,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  fn fact_by_id(
    &self,
    fact_id: String,
  ) -> impl Future<Output = Result<Option<FactRow>, Self::Error>> + Send + '_;

  fn fact_count(&self)
  -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The latest load timestamp already merged into the fact tier.
  fn merge_watermark(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  fn set_merge_watermark(
    &self,
    watermark: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Quality ───────────────────────────────────────────────────────────

  /// Append one report's check rows to the quality history.
  fn record_quality(
    &self,
    report: QualityReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Referential and business-rule audit across the dimensional tier.
  /// `tolerance` bounds the permitted `line_total` drift.
  fn warehouse_audit(
    &self,
    tolerance: f64,
  ) -> impl Future<Output = Result<WarehouseAudit, Self::Error>> + Send + '_;
}
