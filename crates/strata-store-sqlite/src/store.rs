//! [`SqliteWarehouse`] — the SQLite implementation of [`WarehouseStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension as _;

use strata_core::{
  calendar::DateRow,
  clean::CleanedTransaction,
  dimension::{
    CustomerAttributes, CustomerVersion, DimensionVersion, ProductAttributes,
    ProductVersion,
  },
  fact::FactRow,
  quality::{QualityCheck, QualityReport, WarehouseAudit},
  raw::{BatchClose, BatchStatus, IngestionBatch, RawRecord},
  store::{AppendOutcome, UpsertOutcome, WarehouseStore},
};

use crate::{
  encode::{
    BatchRow, CleanedRow, CustomerRow, FactSalesRow, LandingRow, ProductRow,
    decode_batch_status, decode_dt, encode_date, encode_dt, encode_naive_dt,
    encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Column lists ────────────────────────────────────────────────────────────

const BATCH_COLS: &str = "batch_id, source_file, status, started_at, ended_at, \
   records_processed, records_inserted, records_failed, error_message";

const LANDING_COLS: &str = "record_id, invoice_no, stock_code, description, \
   quantity, invoice_date, unit_price, customer_id, country, source_file, \
   batch_id, load_timestamp, content_hash";

const CLEANED_COLS: &str = "raw_id, content_hash, batch_id, load_timestamp, \
   invoice, stock_code, description, quantity, unit_price, invoiced_at, \
   customer_id, country, line_total, date_key, is_return, is_cancelled, \
   is_complete, has_customer_id, has_valid_description, is_valid_transaction";

const PRODUCT_COLS: &str = "product_key, stock_code, description, category, \
   performance_tier, total_quantity, total_revenue, effective_date, \
   expiration_date, is_current, version_number";

const CUSTOMER_COLS: &str = "customer_key, customer_id, country, segment, \
   total_orders, lifetime_value, first_purchase, last_purchase, \
   effective_date, expiration_date, is_current, version_number";

const FACT_COLS: &str = "fact_id, date_key, product_key, customer_key, \
   invoice, stock_code, quantity, unit_price, line_total, discount, \
   net_amount, is_return, is_cancelled, source_raw_id, batch_id, \
   load_timestamp";

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn batch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BatchRow> {
  Ok(BatchRow {
    batch_id:          row.get(0)?,
    source_file:       row.get(1)?,
    status:            row.get(2)?,
    started_at:        row.get(3)?,
    ended_at:          row.get(4)?,
    records_processed: row.get(5)?,
    records_inserted:  row.get(6)?,
    records_failed:    row.get(7)?,
    error_message:     row.get(8)?,
  })
}

fn landing_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LandingRow> {
  Ok(LandingRow {
    record_id:      row.get(0)?,
    invoice_no:     row.get(1)?,
    stock_code:     row.get(2)?,
    description:    row.get(3)?,
    quantity:       row.get(4)?,
    invoice_date:   row.get(5)?,
    unit_price:     row.get(6)?,
    customer_id:    row.get(7)?,
    country:        row.get(8)?,
    source_file:    row.get(9)?,
    batch_id:       row.get(10)?,
    load_timestamp: row.get(11)?,
    content_hash:   row.get(12)?,
  })
}

fn cleaned_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CleanedRow> {
  Ok(CleanedRow {
    raw_id:                row.get(0)?,
    content_hash:          row.get(1)?,
    batch_id:              row.get(2)?,
    load_timestamp:        row.get(3)?,
    invoice:               row.get(4)?,
    stock_code:            row.get(5)?,
    description:           row.get(6)?,
    quantity:              row.get(7)?,
    unit_price:            row.get(8)?,
    invoiced_at:           row.get(9)?,
    customer_id:           row.get(10)?,
    country:               row.get(11)?,
    line_total:            row.get(12)?,
    date_key:              row.get(13)?,
    is_return:             row.get(14)?,
    is_cancelled:          row.get(15)?,
    is_complete:           row.get(16)?,
    has_customer_id:       row.get(17)?,
    has_valid_description: row.get(18)?,
    is_valid_transaction:  row.get(19)?,
  })
}

fn product_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRow> {
  Ok(ProductRow {
    product_key:      row.get(0)?,
    stock_code:       row.get(1)?,
    description:      row.get(2)?,
    category:         row.get(3)?,
    performance_tier: row.get(4)?,
    total_quantity:   row.get(5)?,
    total_revenue:    row.get(6)?,
    effective_date:   row.get(7)?,
    expiration_date:  row.get(8)?,
    is_current:       row.get(9)?,
    version_number:   row.get(10)?,
  })
}

fn customer_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CustomerRow> {
  Ok(CustomerRow {
    customer_key:    row.get(0)?,
    customer_id:     row.get(1)?,
    country:         row.get(2)?,
    segment:         row.get(3)?,
    total_orders:    row.get(4)?,
    lifetime_value:  row.get(5)?,
    first_purchase:  row.get(6)?,
    last_purchase:   row.get(7)?,
    effective_date:  row.get(8)?,
    expiration_date: row.get(9)?,
    is_current:      row.get(10)?,
    version_number:  row.get(11)?,
  })
}

fn fact_sales_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FactSalesRow> {
  Ok(FactSalesRow {
    fact_id:        row.get(0)?,
    date_key:       row.get(1)?,
    product_key:    row.get(2)?,
    customer_key:   row.get(3)?,
    invoice:        row.get(4)?,
    stock_code:     row.get(5)?,
    quantity:       row.get(6)?,
    unit_price:     row.get(7)?,
    line_total:     row.get(8)?,
    discount:       row.get(9)?,
    net_amount:     row.get(10)?,
    is_return:      row.get(11)?,
    is_cancelled:   row.get(12)?,
    source_raw_id:  row.get(13)?,
    batch_id:       row.get(14)?,
    load_timestamp: row.get(15)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata warehouse backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

const WATERMARK_KEY: &str = "merge_watermark";

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory warehouse — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// What the batch-transition update found when it looked at the stored row.
enum TransitionProbe {
  Applied,
  NotFound,
  Refused(String),
}

impl WarehouseStore for SqliteWarehouse {
  type Error = Error;

  // ── Batch log ─────────────────────────────────────────────────────────────

  async fn begin_batch(&self, batch: IngestionBatch) -> Result<()> {
    let started_at = encode_dt(batch.started_at);
    let ended_at = batch.ended_at.map(encode_dt);
    let status = batch.status.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO ingestion_batches ({BATCH_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(batch_id) DO UPDATE SET
               source_file       = excluded.source_file,
               status            = excluded.status,
               started_at        = excluded.started_at,
               ended_at          = excluded.ended_at,
               records_processed = excluded.records_processed,
               records_inserted  = excluded.records_inserted,
               records_failed    = excluded.records_failed,
               error_message     = excluded.error_message"
          ),
          rusqlite::params![
            batch.batch_id,
            batch.source_file,
            status,
            started_at,
            ended_at,
            batch.records_processed,
            batch.records_inserted,
            batch.records_failed,
            batch.error_message,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn transition_batch(
    &self,
    batch_id: String,
    status: BatchStatus,
    close: Option<BatchClose>,
    error_message: Option<String>,
  ) -> Result<()> {
    // Prior states from which the requested target is legal.
    let allowed: Vec<&'static str> = [
      BatchStatus::Started,
      BatchStatus::Running,
      BatchStatus::Success,
      BatchStatus::Failed,
    ]
    .into_iter()
    .filter(|prior| prior.can_transition_to(status))
    .map(BatchStatus::as_str)
    .collect();

    let id = batch_id.clone();
    let status_str = status.as_str();
    let ended_at = status.is_terminal().then(|| encode_dt(Utc::now()));

    let probe = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let current: Option<String> = tx
          .query_row(
            "SELECT status FROM ingestion_batches WHERE batch_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;

        let Some(current) = current else {
          return Ok(TransitionProbe::NotFound);
        };
        if !allowed.contains(&current.as_str()) {
          return Ok(TransitionProbe::Refused(current));
        }

        tx.execute(
          "UPDATE ingestion_batches
           SET status            = ?2,
               ended_at          = COALESCE(?3, ended_at),
               records_processed = COALESCE(?4, records_processed),
               records_inserted  = COALESCE(?5, records_inserted),
               records_failed    = COALESCE(?6, records_failed),
               error_message     = COALESCE(?7, error_message)
           WHERE batch_id = ?1 AND status = ?8",
          rusqlite::params![
            id,
            status_str,
            ended_at,
            close.map(|c| c.records_processed),
            close.map(|c| c.records_inserted),
            close.map(|c| c.records_failed),
            error_message,
            current,
          ],
        )?;
        tx.commit()?;
        Ok(TransitionProbe::Applied)
      })
      .await?;

    match probe {
      TransitionProbe::Applied => Ok(()),
      TransitionProbe::NotFound => {
        Err(strata_core::Error::BatchNotFound(batch_id).into())
      }
      TransitionProbe::Refused(prior) => {
        if decode_batch_status(&prior)?.is_terminal() {
          Err(strata_core::Error::BatchTerminal(batch_id, prior).into())
        } else {
          Err(
            strata_core::Error::InvalidTransition {
              from: prior,
              to:   status.as_str().to_owned(),
            }
            .into(),
          )
        }
      }
    }
  }

  async fn get_batch(&self, batch_id: String) -> Result<Option<IngestionBatch>> {
    let raw: Option<BatchRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {BATCH_COLS} FROM ingestion_batches WHERE batch_id = ?1"
              ),
              rusqlite::params![batch_id],
              batch_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(BatchRow::into_batch).transpose()
  }

  async fn list_batches(&self, limit: u32) -> Result<Vec<IngestionBatch>> {
    let raws: Vec<BatchRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {BATCH_COLS} FROM ingestion_batches
           ORDER BY started_at DESC, batch_id DESC
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], batch_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(BatchRow::into_batch).collect()
  }

  // ── Raw tier — append-only writes ─────────────────────────────────────────

  async fn append_raw(&self, records: Vec<RawRecord>) -> Result<AppendOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = AppendOutcome::default();
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT OR IGNORE INTO raw_records ({LANDING_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
          ))?;
          for record in &records {
            let affected = stmt.execute(rusqlite::params![
              encode_uuid(record.record_id),
              record.row.invoice,
              record.row.stock_code,
              record.row.description,
              record.row.quantity,
              record.row.invoice_date,
              record.row.unit_price,
              record.row.customer_id,
              record.row.country,
              record.source_file,
              record.batch_id,
              encode_dt(record.load_timestamp),
              record.content_hash,
            ])?;
            if affected == 1 {
              outcome.inserted += 1;
            } else {
              outcome.duplicates += 1;
            }
          }
        }
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn raw_for_batch(&self, batch_id: String) -> Result<Vec<RawRecord>> {
    let raws: Vec<LandingRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LANDING_COLS} FROM raw_records
           WHERE batch_id = ?1
           ORDER BY load_timestamp, record_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![batch_id], landing_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(LandingRow::into_record).collect()
  }

  async fn raw_count(&self) -> Result<u64> {
    let count: u64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM raw_records", [], |r| r.get(0))?)
      })
      .await?;
    Ok(count)
  }

  // ── Cleaned tier ──────────────────────────────────────────────────────────

  async fn replace_cleaned(
    &self,
    batch_id: String,
    rows: Vec<CleanedTransaction>,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cleaned_transactions WHERE batch_id = ?1", [
          &batch_id,
        ])?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO cleaned_transactions ({CLEANED_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
          ))?;
          for txn in &rows {
            stmt.execute(rusqlite::params![
              encode_uuid(txn.raw_id),
              txn.content_hash,
              txn.batch_id,
              encode_dt(txn.load_timestamp),
              txn.invoice,
              txn.stock_code,
              txn.description,
              txn.quantity,
              txn.unit_price,
              encode_naive_dt(txn.invoiced_at),
              txn.customer_id,
              txn.country,
              txn.line_total,
              txn.date_key,
              txn.is_return,
              txn.is_cancelled,
              txn.flags.is_complete,
              txn.flags.has_customer_id,
              txn.flags.has_valid_description,
              txn.flags.is_valid_transaction,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn cleaned_for_batch(
    &self,
    batch_id: String,
  ) -> Result<Vec<CleanedTransaction>> {
    let raws: Vec<CleanedRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CLEANED_COLS} FROM cleaned_transactions
           WHERE batch_id = ?1
           ORDER BY load_timestamp, raw_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![batch_id], cleaned_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(CleanedRow::into_transaction).collect()
  }

  async fn cleaned_since(
    &self,
    watermark: Option<DateTime<Utc>>,
  ) -> Result<Vec<CleanedTransaction>> {
    let watermark_str = watermark.map(encode_dt);

    let raws: Vec<CleanedRow> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(mark) = watermark_str {
          // RFC 3339 strings in a single offset sort chronologically, so the
          // at-or-after comparison works directly on the text column.
          let mut stmt = conn.prepare(&format!(
            "SELECT {CLEANED_COLS} FROM cleaned_transactions
             WHERE load_timestamp >= ?1
             ORDER BY load_timestamp, raw_id"
          ))?;
          stmt
            .query_map(rusqlite::params![mark], cleaned_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {CLEANED_COLS} FROM cleaned_transactions
             ORDER BY load_timestamp, raw_id"
          ))?;
          stmt
            .query_map([], cleaned_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(CleanedRow::into_transaction).collect()
  }

  // ── Product dimension ─────────────────────────────────────────────────────

  async fn current_product(
    &self,
    stock_code: String,
  ) -> Result<Option<ProductVersion>> {
    let raw: Option<ProductRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PRODUCT_COLS} FROM dim_product
                 WHERE stock_code = ?1 AND is_current = 1"
              ),
              rusqlite::params![stock_code],
              product_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(ProductRow::into_version).transpose()
  }

  async fn current_products(&self) -> Result<Vec<ProductVersion>> {
    let raws: Vec<ProductRow> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PRODUCT_COLS} FROM dim_product
           WHERE is_current = 1
           ORDER BY stock_code"
        ))?;
        let rows = stmt
          .query_map([], product_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(ProductRow::into_version).collect()
  }

  async fn product_versions(
    &self,
    stock_code: String,
  ) -> Result<Vec<ProductVersion>> {
    let raws: Vec<ProductRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PRODUCT_COLS} FROM dim_product
           WHERE stock_code = ?1
           ORDER BY version_number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![stock_code], product_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(ProductRow::into_version).collect()
  }

  async fn insert_product_version(
    &self,
    stock_code: String,
    attributes: ProductAttributes,
    as_of: NaiveDate,
  ) -> Result<ProductVersion> {
    let attrs = attributes.clone();
    let key_for_return = stock_code.clone();
    let effective = encode_date(as_of);

    let surrogate_key: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dim_product (
             stock_code, description, category, performance_tier,
             total_quantity, total_revenue, effective_date, expiration_date,
             is_current, version_number
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 1, 1)",
          rusqlite::params![
            stock_code,
            attributes.description,
            attributes.category,
            attributes.performance_tier.as_str(),
            attributes.total_quantity,
            attributes.total_revenue,
            effective,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(DimensionVersion {
      surrogate_key,
      natural_key: key_for_return,
      attributes: attrs,
      effective_date: as_of,
      expiration_date: None,
      is_current: true,
      version_number: 1,
    })
  }

  async fn revise_product(
    &self,
    prior: ProductVersion,
    attributes: ProductAttributes,
    as_of: NaiveDate,
  ) -> Result<ProductVersion> {
    let attrs = attributes.clone();
    let natural_key = prior.natural_key.clone();
    let prior_key = prior.surrogate_key;
    let next_version = prior.version_number + 1;
    let effective = encode_date(as_of);

    let surrogate_key: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Close the prior version; zero rows affected means a concurrent
        // revision got there first and the caller's snapshot is stale. The
        // transaction is dropped without committing in that case.
        let closed = tx.execute(
          "UPDATE dim_product
           SET is_current = 0, expiration_date = ?2
           WHERE product_key = ?1 AND is_current = 1",
          rusqlite::params![prior_key, effective],
        )?;
        if closed == 0 {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO dim_product (
             stock_code, description, category, performance_tier,
             total_quantity, total_revenue, effective_date, expiration_date,
             is_current, version_number
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 1, ?8)",
          rusqlite::params![
            prior.natural_key,
            attributes.description,
            attributes.category,
            attributes.performance_tier.as_str(),
            attributes.total_quantity,
            attributes.total_revenue,
            effective,
            next_version,
          ],
        )?;
        let key = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(key))
      })
      .await?;

    let surrogate_key =
      surrogate_key.ok_or(strata_core::Error::StaleRevision(prior_key))?;

    Ok(DimensionVersion {
      surrogate_key,
      natural_key,
      attributes: attrs,
      effective_date: as_of,
      expiration_date: None,
      is_current: true,
      version_number: next_version,
    })
  }

  // ── Customer dimension ────────────────────────────────────────────────────

  async fn current_customer(
    &self,
    customer_id: String,
  ) -> Result<Option<CustomerVersion>> {
    let raw: Option<CustomerRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CUSTOMER_COLS} FROM dim_customer
                 WHERE customer_id = ?1 AND is_current = 1"
              ),
              rusqlite::params![customer_id],
              customer_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(CustomerRow::into_version).transpose()
  }

  async fn current_customers(&self) -> Result<Vec<CustomerVersion>> {
    let raws: Vec<CustomerRow> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CUSTOMER_COLS} FROM dim_customer
           WHERE is_current = 1
           ORDER BY customer_id"
        ))?;
        let rows = stmt
          .query_map([], customer_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(CustomerRow::into_version).collect()
  }

  async fn customer_versions(
    &self,
    customer_id: String,
  ) -> Result<Vec<CustomerVersion>> {
    let raws: Vec<CustomerRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CUSTOMER_COLS} FROM dim_customer
           WHERE customer_id = ?1
           ORDER BY version_number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![customer_id], customer_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(CustomerRow::into_version).collect()
  }

  async fn insert_customer_version(
    &self,
    customer_id: String,
    attributes: CustomerAttributes,
    as_of: NaiveDate,
  ) -> Result<CustomerVersion> {
    let attrs = attributes.clone();
    let key_for_return = customer_id.clone();
    let effective = encode_date(as_of);

    let surrogate_key: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dim_customer (
             customer_id, country, segment, total_orders, lifetime_value,
             first_purchase, last_purchase, effective_date, expiration_date,
             is_current, version_number
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, 1, 1)",
          rusqlite::params![
            customer_id,
            attributes.country,
            attributes.segment.as_str(),
            attributes.total_orders,
            attributes.lifetime_value,
            attributes.first_purchase.map(encode_date),
            attributes.last_purchase.map(encode_date),
            effective,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(DimensionVersion {
      surrogate_key,
      natural_key: key_for_return,
      attributes: attrs,
      effective_date: as_of,
      expiration_date: None,
      is_current: true,
      version_number: 1,
    })
  }

  async fn revise_customer(
    &self,
    prior: CustomerVersion,
    attributes: CustomerAttributes,
    as_of: NaiveDate,
  ) -> Result<CustomerVersion> {
    let attrs = attributes.clone();
    let natural_key = prior.natural_key.clone();
    let prior_key = prior.surrogate_key;
    let next_version = prior.version_number + 1;
    let effective = encode_date(as_of);

    let surrogate_key: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let closed = tx.execute(
          "UPDATE dim_customer
           SET is_current = 0, expiration_date = ?2
           WHERE customer_key = ?1 AND is_current = 1",
          rusqlite::params![prior_key, effective],
        )?;
        if closed == 0 {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO dim_customer (
             customer_id, country, segment, total_orders, lifetime_value,
             first_purchase, last_purchase, effective_date, expiration_date,
             is_current, version_number
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, 1, ?9)",
          rusqlite::params![
            prior.natural_key,
            attributes.country,
            attributes.segment.as_str(),
            attributes.total_orders,
            attributes.lifetime_value,
            attributes.first_purchase.map(encode_date),
            attributes.last_purchase.map(encode_date),
            effective,
            next_version,
          ],
        )?;
        let key = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(key))
      })
      .await?;

    let surrogate_key =
      surrogate_key.ok_or(strata_core::Error::StaleRevision(prior_key))?;

    Ok(DimensionVersion {
      surrogate_key,
      natural_key,
      attributes: attrs,
      effective_date: as_of,
      expiration_date: None,
      is_current: true,
      version_number: next_version,
    })
  }

  // ── Calendar dimension ────────────────────────────────────────────────────

  async fn ensure_calendar(&self, rows: Vec<DateRow>) -> Result<u64> {
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO dim_date (
               date_key, full_date, day_of_week, day_name, day_of_month,
               day_of_year, week_of_year, month_number, month_name, quarter,
               quarter_name, year, is_weekend, is_holiday, fiscal_year,
               fiscal_quarter, is_business_day
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                       ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
          )?;
          for day in &rows {
            let affected = stmt.execute(rusqlite::params![
              day.date_key,
              encode_date(day.full_date),
              day.day_of_week,
              day.day_name,
              day.day_of_month,
              day.day_of_year,
              day.week_of_year,
              day.month_number,
              day.month_name,
              day.quarter,
              day.quarter_name,
              day.year,
              day.is_weekend,
              day.is_holiday,
              day.fiscal_year,
              day.fiscal_quarter,
              day.is_business_day,
            ])?;
            inserted += affected as u64;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;
    Ok(inserted)
  }

  async fn calendar_bounds(&self) -> Result<Option<(i32, i32)>> {
    let bounds: (Option<i32>, Option<i32>) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT MIN(date_key), MAX(date_key) FROM dim_date",
          [],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    Ok(match bounds {
      (Some(min), Some(max)) => Some((min, max)),
      _ => None,
    })
  }

  // ── Fact tier ─────────────────────────────────────────────────────────────

  async fn upsert_facts(&self, rows: Vec<FactRow>) -> Result<UpsertOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = UpsertOutcome::default();
        {
          let mut exists_stmt =
            tx.prepare("SELECT 1 FROM fact_sales WHERE fact_id = ?1")?;
          let mut upsert_stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO fact_sales ({FACT_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16)"
          ))?;

          for fact in &rows {
            let exists: bool = exists_stmt
              .query_row(rusqlite::params![fact.fact_id], |_| Ok(true))
              .optional()?
              .unwrap_or(false);

            upsert_stmt.execute(rusqlite::params![
              fact.fact_id,
              fact.date_key,
              fact.product_key,
              fact.customer_key,
              fact.invoice,
              fact.stock_code,
              fact.quantity,
              fact.unit_price,
              fact.line_total,
              fact.discount,
              fact.net_amount,
              fact.is_return,
              fact.is_cancelled,
              encode_uuid(fact.source_raw_id),
              fact.batch_id,
              encode_dt(fact.load_timestamp),
            ])?;

            if exists {
              outcome.updated += 1;
            } else {
              outcome.inserted += 1;
            }
          }
        }
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn fact_by_id(&self, fact_id: String) -> Result<Option<FactRow>> {
    let raw: Option<FactSalesRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {FACT_COLS} FROM fact_sales WHERE fact_id = ?1"),
              rusqlite::params![fact_id],
              fact_sales_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(FactSalesRow::into_fact).transpose()
  }

  async fn fact_count(&self) -> Result<u64> {
    let count: u64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM fact_sales", [], |r| r.get(0))?)
      })
      .await?;
    Ok(count)
  }

  async fn merge_watermark(&self) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM warehouse_meta WHERE key = ?1",
              rusqlite::params![WATERMARK_KEY],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    value.as_deref().map(decode_dt).transpose()
  }

  async fn set_merge_watermark(&self, watermark: DateTime<Utc>) -> Result<()> {
    let value = encode_dt(watermark);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO warehouse_meta (key, value) VALUES (?1, ?2)",
          rusqlite::params![WATERMARK_KEY, value],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Quality ───────────────────────────────────────────────────────────────

  async fn record_quality(&self, report: QualityReport) -> Result<()> {
    // Persist one row per check so the history stays queryable per rule; a
    // checkless report still leaves a summary row.
    let checks = if report.checks.is_empty() {
      vec![QualityCheck::new("layer_summary", report.layer.as_str(), 0, 0)]
    } else {
      report.checks.clone()
    };
    let measured_at = encode_dt(report.measured_at);
    let layer = report.layer.as_str();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO quality_metrics (
               batch_id, layer, check_name, table_name, failed_records,
               total_records, failure_pct, status, completeness, validity,
               consistency, overall, measured_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          )?;
          for check in &checks {
            stmt.execute(rusqlite::params![
              report.batch_id,
              layer,
              check.check_name,
              check.table_name,
              check.failed_records,
              check.total_records,
              check.failure_pct,
              check.status.as_str(),
              report.completeness,
              report.validity,
              report.consistency,
              report.overall,
              measured_at,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn warehouse_audit(&self, tolerance: f64) -> Result<WarehouseAudit> {
    let audit = self
      .conn
      .call(move |conn| {
        let scalar = |sql: &str| -> rusqlite::Result<u64> {
          conn.query_row(sql, [], |r| r.get(0))
        };

        let fact_count = scalar("SELECT COUNT(*) FROM fact_sales")?;
        let orphan_product_facts = scalar(
          "SELECT COUNT(*) FROM fact_sales f
           LEFT JOIN dim_product p ON p.product_key = f.product_key
           WHERE p.product_key IS NULL",
        )?;
        let orphan_date_facts = scalar(
          "SELECT COUNT(*) FROM fact_sales f
           LEFT JOIN dim_date d ON d.date_key = f.date_key
           WHERE d.date_key IS NULL",
        )?;
        let orphan_customer_facts = scalar(
          "SELECT COUNT(*) FROM fact_sales f
           WHERE f.customer_key IS NOT NULL
             AND NOT EXISTS (
               SELECT 1 FROM dim_customer c
               WHERE c.customer_key = f.customer_key
             )",
        )?;
        let measure_mismatch_facts: u64 = conn.query_row(
          "SELECT COUNT(*) FROM fact_sales
           WHERE ABS(line_total - quantity * unit_price) > ?1",
          rusqlite::params![tolerance],
          |r| r.get(0),
        )?;

        let dup_keys = |sql: &str| -> rusqlite::Result<Vec<String>> {
          let mut stmt = conn.prepare(sql)?;
          let keys = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          Ok(keys)
        };

        let duplicate_current_products = dup_keys(
          "SELECT stock_code FROM dim_product
           WHERE is_current = 1
           GROUP BY stock_code HAVING COUNT(*) > 1
           ORDER BY stock_code",
        )?;
        let duplicate_current_customers = dup_keys(
          "SELECT customer_id FROM dim_customer
           WHERE is_current = 1
           GROUP BY customer_id HAVING COUNT(*) > 1
           ORDER BY customer_id",
        )?;

        Ok(WarehouseAudit {
          fact_count,
          orphan_product_facts,
          orphan_date_facts,
          orphan_customer_facts,
          measure_mismatch_facts,
          duplicate_current_products,
          duplicate_current_customers,
        })
      })
      .await?;
    Ok(audit)
  }
}
