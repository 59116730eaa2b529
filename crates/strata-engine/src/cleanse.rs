//! Stage 2 — cleaning and validation.
//!
//! Recomputes the cleaned view for one batch. The transformation itself is
//! the pure [`strata_core::clean::clean`] function; this stage only feeds it
//! and persists the results, so re-running it is always safe.

use std::collections::BTreeMap;

use serde::Serialize;
use strata_core::{
  clean::CleanOutcome,
  store::WarehouseStore,
};

use crate::{Engine, EngineError, Result};

/// Outcome of one cleaning run.
#[derive(Debug, Clone, Serialize)]
pub struct CleanseReport {
  pub batch_id: String,
  pub kept:     u64,
  /// Hard rejects by reason code.
  pub rejects:  BTreeMap<&'static str, u64>,
}

impl CleanseReport {
  pub fn rejected_total(&self) -> u64 {
    self.rejects.values().sum()
  }
}

impl<S: WarehouseStore> Engine<S> {
  /// Clean every raw record of `batch_id` and replace the batch's cleaned
  /// view with the surviving rows.
  pub async fn cleanse_batch(&self, batch_id: &str) -> Result<CleanseReport> {
    if self
      .store
      .get_batch(batch_id.to_owned())
      .await
      .map_err(EngineError::store)?
      .is_none()
    {
      return Err(EngineError::BatchNotFound(batch_id.to_owned()));
    }

    let records = self
      .store
      .raw_for_batch(batch_id.to_owned())
      .await
      .map_err(EngineError::store)?;

    let mut kept = Vec::with_capacity(records.len());
    let mut rejects: BTreeMap<&'static str, u64> = BTreeMap::new();

    for record in &records {
      match strata_core::clean::clean(record, &self.config.cleaning) {
        CleanOutcome::Kept(txn) => kept.push(txn),
        CleanOutcome::Rejected { raw_id, reason } => {
          tracing::debug!(batch_id, %raw_id, reason = reason.code(), "raw record rejected");
          *rejects.entry(reason.code()).or_default() += 1;
        }
      }
    }

    let report = CleanseReport {
      batch_id: batch_id.to_owned(),
      kept: kept.len() as u64,
      rejects,
    };

    self
      .store
      .replace_cleaned(batch_id.to_owned(), kept)
      .await
      .map_err(EngineError::store)?;

    if report.rejected_total() > 0 {
      tracing::warn!(
        batch_id,
        kept = report.kept,
        rejected = report.rejected_total(),
        "cleaning dropped records"
      );
    } else {
      tracing::info!(batch_id, kept = report.kept, "batch cleaned");
    }

    Ok(report)
  }
}
