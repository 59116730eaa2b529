//! Raw-landing types — the fundamental unit of the append-only tier.
//!
//! A raw record is one source row exactly as received, with every natural
//! field kept as text. Records are never updated or deleted; corrections
//! flow forward as new transactions. The content fingerprint detects exact
//! duplicates within and across batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ─── RawRow ──────────────────────────────────────────────────────────────────

/// The eight natural fields of a retail transaction line, untyped.
///
/// Everything stays a string (or absent) until the cleaning stage coerces it.
/// Arbitrary source encodings are tolerated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
  pub invoice:      Option<String>,
  pub stock_code:   Option<String>,
  pub description:  Option<String>,
  pub quantity:     Option<String>,
  pub invoice_date: Option<String>,
  pub unit_price:   Option<String>,
  pub customer_id:  Option<String>,
  pub country:      Option<String>,
}

impl RawRow {
  /// Deterministic content fingerprint: SHA-256 over all natural fields
  /// joined with `|`, missing fields encoding as the empty string.
  ///
  /// Two rows with identical natural content always hash identically, which
  /// is what makes re-ingestion of the same batch idempotent.
  pub fn fingerprint(&self) -> String {
    let fields = [
      &self.invoice,
      &self.stock_code,
      &self.description,
      &self.quantity,
      &self.invoice_date,
      &self.unit_price,
      &self.customer_id,
      &self.country,
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
      if i > 0 {
        hasher.update(b"|");
      }
      if let Some(value) = field {
        hasher.update(value.as_bytes());
      }
    }
    hex::encode(hasher.finalize())
  }
}

// ─── RawRecord ───────────────────────────────────────────────────────────────

/// One source row as landed in the raw store, stamped with lineage metadata.
/// Once written, no field is ever updated (append-only tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
  pub record_id:      Uuid,
  pub row:            RawRow,
  pub source_file:    String,
  pub batch_id:       String,
  pub load_timestamp: DateTime<Utc>,
  pub content_hash:   String,
}

impl RawRecord {
  /// Stamp a source row with lineage metadata and its content fingerprint.
  pub fn stamp(
    row: RawRow,
    source_file: &str,
    batch_id: &str,
    load_timestamp: DateTime<Utc>,
  ) -> Self {
    let content_hash = row.fingerprint();
    Self {
      record_id: Uuid::new_v4(),
      row,
      source_file: source_file.to_owned(),
      batch_id: batch_id.to_owned(),
      load_timestamp,
      content_hash,
    }
  }
}

// ─── Batch lifecycle ─────────────────────────────────────────────────────────

/// Batch status; `Success` and `Failed` are terminal and never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchStatus {
  Started,
  Running,
  Success,
  Failed,
}

impl BatchStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Success | Self::Failed)
  }

  /// The status string persisted in the batch log.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Started => "STARTED",
      Self::Running => "RUNNING",
      Self::Success => "SUCCESS",
      Self::Failed => "FAILED",
    }
  }

  /// Legal transitions: `STARTED -> RUNNING -> {SUCCESS | FAILED}`, plus
  /// `STARTED -> FAILED` for batches that die before processing begins.
  pub fn can_transition_to(self, next: BatchStatus) -> bool {
    matches!(
      (self, next),
      (Self::Started, Self::Running)
        | (Self::Started, Self::Failed)
        | (Self::Running, Self::Success)
        | (Self::Running, Self::Failed)
    )
  }
}

/// One ingestion job in the batch log.
///
/// A batch reaching `Failed` leaves already-inserted raw rows intact; the
/// batch record, not the raw store, carries the failure signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionBatch {
  pub batch_id:          String,
  pub source_file:       String,
  pub status:            BatchStatus,
  pub started_at:        DateTime<Utc>,
  pub ended_at:          Option<DateTime<Utc>>,
  pub records_processed: u64,
  pub records_inserted:  u64,
  pub records_failed:    u64,
  pub error_message:     Option<String>,
}

impl IngestionBatch {
  /// A freshly opened batch in the `Started` state.
  pub fn open(batch_id: &str, source_file: &str, started_at: DateTime<Utc>) -> Self {
    Self {
      batch_id: batch_id.to_owned(),
      source_file: source_file.to_owned(),
      status: BatchStatus::Started,
      started_at,
      ended_at: None,
      records_processed: 0,
      records_inserted: 0,
      records_failed: 0,
      error_message: None,
    }
  }

  /// Rows the batch saw but declined to land because an identical
  /// fingerprint had already been stored.
  pub fn duplicates(&self) -> u64 {
    self
      .records_processed
      .saturating_sub(self.records_inserted + self.records_failed)
  }
}

/// Final counts recorded when a batch reaches a terminal state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchClose {
  pub records_processed: u64,
  pub records_inserted:  u64,
  pub records_failed:    u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fingerprint_is_deterministic() {
    let row = RawRow {
      invoice: Some("536365".into()),
      stock_code: Some("85123A".into()),
      description: Some("WHITE HANGER".into()),
      quantity: Some("6".into()),
      invoice_date: Some("2010-12-01 08:26".into()),
      unit_price: Some("2.55".into()),
      customer_id: Some("17850".into()),
      country: Some("United Kingdom".into()),
    };
    assert_eq!(row.fingerprint(), row.clone().fingerprint());
    assert_eq!(row.fingerprint().len(), 64);
  }

  #[test]
  fn fingerprint_distinguishes_missing_from_shifted_fields() {
    // "ab" in invoice must not collide with "a" in invoice and "b" in
    // stock_code; the separator guarantees it.
    let a = RawRow { invoice: Some("ab".into()), ..Default::default() };
    let b = RawRow {
      invoice: Some("a".into()),
      stock_code: Some("b".into()),
      ..Default::default()
    };
    assert_ne!(a.fingerprint(), b.fingerprint());
  }

  #[test]
  fn terminal_states_admit_no_transition() {
    for terminal in [BatchStatus::Success, BatchStatus::Failed] {
      assert!(terminal.is_terminal());
      for next in [
        BatchStatus::Started,
        BatchStatus::Running,
        BatchStatus::Success,
        BatchStatus::Failed,
      ] {
        assert!(!terminal.can_transition_to(next));
      }
    }
    assert!(BatchStatus::Started.can_transition_to(BatchStatus::Running));
    assert!(BatchStatus::Running.can_transition_to(BatchStatus::Failed));
    assert!(!BatchStatus::Started.can_transition_to(BatchStatus::Success));
  }
}
