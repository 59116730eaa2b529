//! Stage 3 — dimension maintenance.
//!
//! Applies type-2 versioning over the product and customer dimensions and
//! keeps the static calendar populated. Attribute snapshots are recomputed
//! from the full cleaned view each run; a natural key whose snapshot is
//! unchanged keeps its current version untouched, so re-running maintenance
//! on unchanged data creates no spurious versions.

use chrono::NaiveDate;
use serde::Serialize;
use strata_core::{
  calendar::build_calendar,
  clean::date_key,
  dimension::{ProductAttributes, customer_rollup, product_rollup},
  store::WarehouseStore,
};

use crate::{Engine, EngineError, Result};

/// Per-dimension change counts from one maintenance run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DimensionCounts {
  pub inserted:  u64,
  pub revised:   u64,
  pub unchanged: u64,
}

/// Outcome of one maintenance run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DimensionReport {
  pub calendar_rows_added: u64,
  pub products:            DimensionCounts,
  pub customers:           DimensionCounts,
}

impl<S: WarehouseStore> Engine<S> {
  /// Bring all three dimensions up to date with the cleaned view.
  ///
  /// `as_of` becomes the effective date of any version opened by this run
  /// and the expiration date of the versions it closes.
  pub async fn maintain_dimensions(&self, as_of: NaiveDate) -> Result<DimensionReport> {
    let calendar_rows_added = self.ensure_calendar().await?;

    let transactions =
      self.store.cleaned_since(None).await.map_err(EngineError::store)?;

    let products = {
      let _guard = self.locks.acquire("dim_product").await?;
      let mut counts = DimensionCounts::default();
      for (stock_code, observation) in product_rollup(&transactions) {
        let attributes = ProductAttributes::from_observation(&observation);
        match self
          .store
          .current_product(stock_code.clone())
          .await
          .map_err(EngineError::store)?
        {
          None => {
            self
              .store
              .insert_product_version(stock_code, attributes, as_of)
              .await
              .map_err(EngineError::store)?;
            counts.inserted += 1;
          }
          Some(current) if current.attributes == attributes => {
            counts.unchanged += 1;
          }
          Some(current) => {
            self
              .store
              .revise_product(current, attributes, as_of)
              .await
              .map_err(EngineError::store)?;
            counts.revised += 1;
          }
        }
      }
      counts
    };

    let customers = {
      let _guard = self.locks.acquire("dim_customer").await?;
      let mut counts = DimensionCounts::default();
      for (customer_id, attributes) in customer_rollup(&transactions) {
        match self
          .store
          .current_customer(customer_id.clone())
          .await
          .map_err(EngineError::store)?
        {
          None => {
            self
              .store
              .insert_customer_version(customer_id, attributes, as_of)
              .await
              .map_err(EngineError::store)?;
            counts.inserted += 1;
          }
          Some(current) if current.attributes == attributes => {
            counts.unchanged += 1;
          }
          Some(current) => {
            self
              .store
              .revise_customer(current, attributes, as_of)
              .await
              .map_err(EngineError::store)?;
            counts.revised += 1;
          }
        }
      }
      counts
    };

    let report = DimensionReport { calendar_rows_added, products, customers };
    tracing::info!(
      products_inserted = products.inserted,
      products_revised = products.revised,
      customers_inserted = customers.inserted,
      customers_revised = customers.revised,
      "dimensions maintained"
    );
    Ok(report)
  }

  /// Generate the calendar over the configured range if any of it is
  /// missing. The dense range check makes repeat calls free.
  async fn ensure_calendar(&self) -> Result<u64> {
    let start = self.config.calendar_start;
    let end = self.config.calendar_end;

    if let Some((min, max)) =
      self.store.calendar_bounds().await.map_err(EngineError::store)?
      && min <= date_key(start)
      && max >= date_key(end)
    {
      return Ok(0);
    }

    let rows = build_calendar(start, end);
    let added =
      self.store.ensure_calendar(rows).await.map_err(EngineError::store)?;
    if added > 0 {
      tracing::info!(added, "calendar dimension generated");
    }
    Ok(added)
  }
}
