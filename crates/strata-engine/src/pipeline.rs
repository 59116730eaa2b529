//! The full five-stage pipeline in dependency order.

use chrono::NaiveDate;
use serde::Serialize;
use strata_core::{fact::MergeMode, raw::RawRow, store::WarehouseStore};

use crate::{
  Engine, Result,
  cleanse::CleanseReport,
  dimensions::DimensionReport,
  ingest::IngestReport,
  quality::QualitySummary,
};

/// Everything one pipeline run did, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
  pub ingest:     IngestReport,
  pub cleanse:    CleanseReport,
  pub dimensions: DimensionReport,
  pub merged:     u64,
  pub updated:    u64,
  pub rejected:   u64,
  pub quality:    QualitySummary,
}

impl<S: WarehouseStore> Engine<S> {
  /// Run ingest, cleanse, dimension maintenance, fact merge, and quality
  /// monitoring for one batch of source rows.
  ///
  /// Stages after a failure do not run; a batch that failed ingestion is
  /// recorded as `FAILED` with its raw rows left in place.
  pub async fn run_pipeline(
    &self,
    batch_id: &str,
    source_file: &str,
    rows: Vec<RawRow>,
    mode: MergeMode,
    as_of: NaiveDate,
  ) -> Result<PipelineReport> {
    let ingest = self.ingest_batch(batch_id, source_file, rows).await?;
    let cleanse = self.cleanse_batch(batch_id).await?;
    let dimensions = self.maintain_dimensions(as_of).await?;
    let merge = self.merge_facts(mode).await?;
    let quality = self.monitor_quality(batch_id).await?;

    Ok(PipelineReport {
      ingest,
      cleanse,
      dimensions,
      merged: merge.inserted,
      updated: merge.updated,
      rejected: merge.rejected_count(),
      quality,
    })
  }
}
