//! Stage 1 — batch ingestion into the raw landing tier.
//!
//! Every ingestion runs under a batch record that moves through
//! `STARTED -> RUNNING -> {SUCCESS | FAILED}`. A failure after some rows
//! landed leaves those rows in place: the raw tier is append-only and the
//! batch record, not the data, carries the failure signal.

use chrono::Utc;
use serde::Serialize;
use strata_core::{
  raw::{BatchClose, BatchStatus, IngestionBatch, RawRecord, RawRow},
  store::WarehouseStore,
};

use crate::{Engine, EngineError, Result};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
  pub batch_id:   String,
  pub processed:  u64,
  pub inserted:   u64,
  /// Rows whose content fingerprint already existed; skipped, not errors.
  pub duplicates: u64,
}

impl<S: WarehouseStore> Engine<S> {
  /// Ingest one batch of source rows.
  ///
  /// Idempotent at the row level: re-ingesting a file only inserts rows
  /// whose content fingerprint has not been seen before. Re-using a batch
  /// id re-opens the batch record as a fresh attempt.
  pub async fn ingest_batch(
    &self,
    batch_id: &str,
    source_file: &str,
    rows: Vec<RawRow>,
  ) -> Result<IngestReport> {
    let batch = IngestionBatch::open(batch_id, source_file, Utc::now());
    self.store.begin_batch(batch).await.map_err(EngineError::store)?;
    self
      .store
      .transition_batch(batch_id.to_owned(), BatchStatus::Running, None, None)
      .await
      .map_err(EngineError::store)?;

    match self.land_rows(batch_id, source_file, rows).await {
      Ok(report) => {
        self
          .store
          .transition_batch(
            batch_id.to_owned(),
            BatchStatus::Success,
            Some(BatchClose {
              records_processed: report.processed,
              records_inserted:  report.inserted,
              records_failed:    0,
            }),
            None,
          )
          .await
          .map_err(EngineError::store)?;

        tracing::info!(
          batch_id,
          processed = report.processed,
          inserted = report.inserted,
          duplicates = report.duplicates,
          "batch ingested"
        );
        Ok(report)
      }
      Err(err) => {
        // Best effort: the original failure is what the caller needs to
        // see, even if the batch record cannot be closed.
        if let Err(close_err) = self
          .store
          .transition_batch(
            batch_id.to_owned(),
            BatchStatus::Failed,
            None,
            Some(err.to_string()),
          )
          .await
        {
          tracing::error!(batch_id, error = %close_err, "failed to mark batch as failed");
        }
        Err(err)
      }
    }
  }

  async fn land_rows(
    &self,
    batch_id: &str,
    source_file: &str,
    rows: Vec<RawRow>,
  ) -> Result<IngestReport> {
    let processed = rows.len() as u64;

    // One load timestamp for the whole batch keeps the merge watermark
    // aligned to batch boundaries.
    let load_timestamp = Utc::now();
    let records: Vec<RawRecord> = rows
      .into_iter()
      .map(|row| RawRecord::stamp(row, source_file, batch_id, load_timestamp))
      .collect();

    let outcome =
      self.store.append_raw(records).await.map_err(EngineError::store)?;

    Ok(IngestReport {
      batch_id: batch_id.to_owned(),
      processed,
      inserted: outcome.inserted,
      duplicates: outcome.duplicates,
    })
  }
}
