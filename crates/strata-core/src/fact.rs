//! Fact tier types — the star-schema grain and merge bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clean::CleanedTransaction;

// ─── FactRow ─────────────────────────────────────────────────────────────────

/// One transaction line resolved against the dimensional tier.
///
/// The surrogate `fact_id` is the source row's content hash, so repeated
/// merges of the same source row are idempotent upserts rather than
/// duplicate inserts. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  pub fact_id:      String,
  pub date_key:     i32,
  pub product_key:  i64,
  pub customer_key: Option<i64>,

  // Degenerate dimensions carried on the fact.
  pub invoice:    String,
  pub stock_code: String,

  // Additive measures.
  pub quantity:   i64,
  pub unit_price: f64,
  pub line_total: f64,
  pub discount:   f64,
  pub net_amount: f64,

  pub is_return:    bool,
  pub is_cancelled: bool,

  // Lineage back to the cleaned/raw tiers.
  pub source_raw_id:  Uuid,
  pub batch_id:       String,
  pub load_timestamp: DateTime<Utc>,
}

impl FactRow {
  /// Assemble a fact row from a cleaned transaction and its resolved keys.
  /// Caller has already enforced the write-time measure rules, so the
  /// measures are guaranteed present here.
  pub fn assemble(
    txn: &CleanedTransaction,
    product_key: i64,
    customer_key: Option<i64>,
    quantity: i64,
    unit_price: f64,
    line_total: f64,
  ) -> Self {
    Self {
      fact_id: txn.content_hash.clone(),
      date_key: txn.date_key,
      product_key,
      customer_key,
      invoice: txn.invoice.clone(),
      stock_code: txn.stock_code.clone(),
      quantity,
      unit_price,
      line_total,
      discount: 0.0,
      net_amount: line_total,
      is_return: txn.is_return,
      is_cancelled: txn.is_cancelled,
      source_raw_id: txn.raw_id,
      batch_id: txn.batch_id.clone(),
      load_timestamp: txn.load_timestamp,
    }
  }
}

// ─── Merge bookkeeping ───────────────────────────────────────────────────────

/// How the fact merger selects its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
  /// Cleaned transactions at or after the high-water mark.
  Incremental,
  /// Reprocess the whole cleaned view, bypassing the watermark.
  FullRefresh,
}

/// Write-time rejection codes. A rejected row is logged and counted, never
/// silently dropped, and never corrupts the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeReject {
  /// The mandatory date join failed; fatal to the row, not the batch.
  UnresolvedDateKey,
  /// No current product version for the stock code. Cannot happen after a
  /// total-coverage maintenance run; accounted for anyway.
  UnresolvedProductKey,
  MissingMeasures,
  ZeroQuantity,
  NegativeUnitPrice,
  /// `line_total` disagrees with `quantity × unit_price` beyond tolerance.
  MeasureMismatch,
}

impl MergeReject {
  pub fn code(self) -> &'static str {
    match self {
      Self::UnresolvedDateKey => "unresolved_date_key",
      Self::UnresolvedProductKey => "unresolved_product_key",
      Self::MissingMeasures => "missing_measures",
      Self::ZeroQuantity => "zero_quantity",
      Self::NegativeUnitPrice => "negative_unit_price",
      Self::MeasureMismatch => "measure_mismatch",
    }
  }
}

/// One row the merger refused to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFact {
  pub raw_id:  Uuid,
  pub invoice: String,
  pub reason:  MergeReject,
}

/// Outcome of one merge run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResult {
  pub inserted: u64,
  pub updated:  u64,
  pub rejected: Vec<RejectedFact>,
}

impl MergeResult {
  pub fn rejected_count(&self) -> u64 {
    self.rejected.len() as u64
  }
}
