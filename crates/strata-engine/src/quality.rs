//! Stage 5 — quality monitoring.
//!
//! Scores all three tiers for one batch and appends the reports to the
//! quality history. Scores are advisory; nothing here blocks a merge.

use serde::Serialize;
use strata_core::{
  quality::{QualityReport, WarehouseAudit, score_cleaned, score_dimensional, score_raw},
  store::WarehouseStore,
};

use crate::{Engine, EngineError, Result};

/// The three layer reports plus the audit they were derived from.
#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
  pub raw:         QualityReport,
  pub cleaned:     QualityReport,
  pub dimensional: QualityReport,
  pub audit:       WarehouseAudit,
}

impl<S: WarehouseStore> Engine<S> {
  /// Score batch `batch_id` across all layers and persist the reports.
  pub async fn monitor_quality(&self, batch_id: &str) -> Result<QualitySummary> {
    let batch = self
      .store
      .get_batch(batch_id.to_owned())
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| EngineError::BatchNotFound(batch_id.to_owned()))?;
    let raw_records = self
      .store
      .raw_for_batch(batch_id.to_owned())
      .await
      .map_err(EngineError::store)?;
    let kept = self
      .store
      .cleaned_for_batch(batch_id.to_owned())
      .await
      .map_err(EngineError::store)?;

    // Raw rows of the batch with no cleaned counterpart are the hard
    // rejects (raw rows are never deleted, cleaned rows map 1:1).
    let hard_rejects = (raw_records.len() - kept.len()) as u64;

    // Landing deduplicates on fingerprint, so the stored rows alone can
    // never show a duplicate; the batch counts carry the skipped ones.
    let raw = score_raw(batch_id, &raw_records, batch.duplicates(), &self.config.quality);
    let cleaned = score_cleaned(batch_id, &kept, hard_rejects, &self.config.quality);

    let audit = self
      .store
      .warehouse_audit(self.config.measure_tolerance)
      .await
      .map_err(EngineError::store)?;
    let dimensional = score_dimensional(batch_id, &audit, &self.config.quality);

    for report in [&raw, &cleaned, &dimensional] {
      tracing::info!(
        batch_id,
        layer = report.layer.as_str(),
        completeness = report.completeness,
        validity = report.validity,
        consistency = report.consistency,
        overall = report.overall,
        "quality scored"
      );
      self
        .store
        .record_quality(report.clone())
        .await
        .map_err(EngineError::store)?;
    }

    if !audit.duplicate_current_products.is_empty()
      || !audit.duplicate_current_customers.is_empty()
    {
      tracing::error!(
        products = ?audit.duplicate_current_products,
        customers = ?audit.duplicate_current_customers,
        "duplicate current dimension versions detected; manual repair required"
      );
    }

    Ok(QualitySummary { raw, cleaned, dimensional, audit })
  }
}
