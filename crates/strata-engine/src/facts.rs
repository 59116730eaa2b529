//! Stage 4 — the fact merger.
//!
//! Resolves cleaned transactions against the dimensional tier and upserts
//! them into `fact_sales`. Incremental runs start from the merge watermark
//! with at-or-after semantics: a row loaded exactly at the watermark is
//! re-merged, which is harmless because fact upserts are idempotent by
//! content hash. Rows that fail a write-time rule are rejected with a coded
//! reason, never silently dropped and never written in a corrupt state.

use std::collections::HashMap;

use strata_core::{
  clean::{CleanedTransaction, round_to_cents},
  fact::{FactRow, MergeMode, MergeReject, MergeResult, RejectedFact},
  store::WarehouseStore,
};

use crate::{Engine, EngineError, Result};

impl<S: WarehouseStore> Engine<S> {
  /// Merge cleaned transactions into the fact table.
  pub async fn merge_facts(&self, mode: MergeMode) -> Result<MergeResult> {
    let _guard = self.locks.acquire("fact_sales").await?;

    let watermark = match mode {
      MergeMode::Incremental => {
        self.store.merge_watermark().await.map_err(EngineError::store)?
      }
      MergeMode::FullRefresh => None,
    };

    let transactions = self
      .store
      .cleaned_since(watermark)
      .await
      .map_err(EngineError::store)?;
    if transactions.is_empty() {
      tracing::info!(?mode, "no cleaned transactions to merge");
      return Ok(MergeResult::default());
    }

    let bounds = self
      .store
      .calendar_bounds()
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::EmptyCalendar)?;

    let product_keys: HashMap<String, i64> = self
      .store
      .current_products()
      .await
      .map_err(EngineError::store)?
      .into_iter()
      .map(|v| (v.natural_key, v.surrogate_key))
      .collect();
    let customer_keys: HashMap<String, i64> = self
      .store
      .current_customers()
      .await
      .map_err(EngineError::store)?
      .into_iter()
      .map(|v| (v.natural_key, v.surrogate_key))
      .collect();

    let mut facts = Vec::with_capacity(transactions.len());
    let mut rejected = Vec::new();
    let mut high_water = watermark;

    for txn in &transactions {
      // The watermark advances over rejected rows too: resolution is
      // deterministic, so re-scanning them next run would reject again.
      high_water = Some(match high_water {
        Some(mark) => mark.max(txn.load_timestamp),
        None => txn.load_timestamp,
      });

      match self.resolve(txn, bounds, &product_keys, &customer_keys) {
        Ok(fact) => facts.push(fact),
        Err(reason) => {
          tracing::warn!(
            invoice = %txn.invoice,
            raw_id = %txn.raw_id,
            reason = reason.code(),
            "fact row rejected"
          );
          rejected.push(RejectedFact {
            raw_id: txn.raw_id,
            invoice: txn.invoice.clone(),
            reason,
          });
        }
      }
    }

    let outcome =
      self.store.upsert_facts(facts).await.map_err(EngineError::store)?;
    if let Some(mark) = high_water {
      self
        .store
        .set_merge_watermark(mark)
        .await
        .map_err(EngineError::store)?;
    }

    let result = MergeResult {
      inserted: outcome.inserted,
      updated:  outcome.updated,
      rejected,
    };
    tracing::info!(
      inserted = result.inserted,
      updated = result.updated,
      rejected = result.rejected_count(),
      "facts merged"
    );
    Ok(result)
  }

  /// Apply the write-time rules and dimension joins to one transaction.
  fn resolve(
    &self,
    txn: &CleanedTransaction,
    calendar_bounds: (i32, i32),
    product_keys: &HashMap<String, i64>,
    customer_keys: &HashMap<String, i64>,
  ) -> Result<FactRow, MergeReject> {
    let (Some(quantity), Some(unit_price)) = (txn.quantity, txn.unit_price)
    else {
      return Err(MergeReject::MissingMeasures);
    };
    if quantity == 0 {
      return Err(MergeReject::ZeroQuantity);
    }
    if unit_price < 0.0 {
      return Err(MergeReject::NegativeUnitPrice);
    }

    // The calendar is dense over its range, so bounds checking is key
    // resolution.
    let (min_key, max_key) = calendar_bounds;
    if txn.date_key < min_key || txn.date_key > max_key {
      return Err(MergeReject::UnresolvedDateKey);
    }

    let Some(&product_key) = product_keys.get(&txn.stock_code) else {
      return Err(MergeReject::UnresolvedProductKey);
    };
    // Anonymous rows carry no customer key; a known id missing from the
    // dimension degrades the same way rather than blocking the row.
    let customer_key = txn
      .customer_id
      .as_ref()
      .and_then(|id| customer_keys.get(id))
      .copied();

    let expected = round_to_cents(quantity as f64 * unit_price);
    let line_total = txn.line_total.unwrap_or(expected);
    if (line_total - expected).abs() > self.config.measure_tolerance {
      return Err(MergeReject::MeasureMismatch);
    }

    Ok(FactRow::assemble(
      txn,
      product_key,
      customer_key,
      quantity,
      unit_price,
      line_total,
    ))
  }
}
