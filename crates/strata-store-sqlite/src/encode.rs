//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All instants are stored as RFC 3339 strings, calendar dates as `%Y-%m-%d`,
//! and invoice timestamps as `%Y-%m-%d %H:%M:%S` (naive, source-local time).
//! UUIDs are stored as hyphenated lowercase strings. Enum columns store the
//! same stable strings the domain types expose via `as_str`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use strata_core::{
  clean::{CleanedTransaction, ValidityFlags},
  dimension::{
    CustomerAttributes, CustomerSegment, CustomerVersion, DimensionVersion,
    PerformanceTier, ProductAttributes, ProductVersion,
  },
  fact::FactRow,
  raw::{BatchStatus, IngestionBatch, RawRecord, RawRow},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Instants and dates ──────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_naive_dt(dt: NaiveDateTime) -> String {
  dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn decode_naive_dt(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── BatchStatus ─────────────────────────────────────────────────────────────

pub fn decode_batch_status(s: &str) -> Result<BatchStatus> {
  match s {
    "STARTED" => Ok(BatchStatus::Started),
    "RUNNING" => Ok(BatchStatus::Running),
    "SUCCESS" => Ok(BatchStatus::Success),
    "FAILED" => Ok(BatchStatus::Failed),
    other => Err(strata_core::Error::UnknownBatchStatus(other.to_owned()).into()),
  }
}

// ─── Dimension enums ─────────────────────────────────────────────────────────

pub fn decode_tier(s: &str) -> Result<PerformanceTier> {
  match s {
    "new" => Ok(PerformanceTier::New),
    "low" => Ok(PerformanceTier::Low),
    "medium" => Ok(PerformanceTier::Medium),
    "high" => Ok(PerformanceTier::High),
    other => Err(Error::Decode(format!("unknown performance tier: {other:?}"))),
  }
}

pub fn decode_segment(s: &str) -> Result<CustomerSegment> {
  match s {
    "prospect" => Ok(CustomerSegment::Prospect),
    "one_time" => Ok(CustomerSegment::OneTime),
    "repeat" => Ok(CustomerSegment::Repeat),
    "loyal" => Ok(CustomerSegment::Loyal),
    "vip" => Ok(CustomerSegment::Vip),
    other => Err(Error::Decode(format!("unknown customer segment: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `ingestion_batches` row.
pub struct BatchRow {
  pub batch_id:          String,
  pub source_file:       String,
  pub status:            String,
  pub started_at:        String,
  pub ended_at:          Option<String>,
  pub records_processed: u64,
  pub records_inserted:  u64,
  pub records_failed:    u64,
  pub error_message:     Option<String>,
}

impl BatchRow {
  pub fn into_batch(self) -> Result<IngestionBatch> {
    Ok(IngestionBatch {
      batch_id: self.batch_id,
      source_file: self.source_file,
      status: decode_batch_status(&self.status)?,
      started_at: decode_dt(&self.started_at)?,
      ended_at: self.ended_at.as_deref().map(decode_dt).transpose()?,
      records_processed: self.records_processed,
      records_inserted: self.records_inserted,
      records_failed: self.records_failed,
      error_message: self.error_message,
    })
  }
}

/// Raw strings read directly from a `raw_records` row.
pub struct LandingRow {
  pub record_id:      String,
  pub invoice_no:     Option<String>,
  pub stock_code:     Option<String>,
  pub description:    Option<String>,
  pub quantity:       Option<String>,
  pub invoice_date:   Option<String>,
  pub unit_price:     Option<String>,
  pub customer_id:    Option<String>,
  pub country:        Option<String>,
  pub source_file:    String,
  pub batch_id:       String,
  pub load_timestamp: String,
  pub content_hash:   String,
}

impl LandingRow {
  pub fn into_record(self) -> Result<RawRecord> {
    Ok(RawRecord {
      record_id: decode_uuid(&self.record_id)?,
      row: RawRow {
        invoice: self.invoice_no,
        stock_code: self.stock_code,
        description: self.description,
        quantity: self.quantity,
        invoice_date: self.invoice_date,
        unit_price: self.unit_price,
        customer_id: self.customer_id,
        country: self.country,
      },
      source_file: self.source_file,
      batch_id: self.batch_id,
      load_timestamp: decode_dt(&self.load_timestamp)?,
      content_hash: self.content_hash,
    })
  }
}

/// Raw values read directly from a `cleaned_transactions` row.
pub struct CleanedRow {
  pub raw_id:                String,
  pub content_hash:          String,
  pub batch_id:              String,
  pub load_timestamp:        String,
  pub invoice:               String,
  pub stock_code:            String,
  pub description:           Option<String>,
  pub quantity:              Option<i64>,
  pub unit_price:            Option<f64>,
  pub invoiced_at:           String,
  pub customer_id:           Option<String>,
  pub country:               Option<String>,
  pub line_total:            Option<f64>,
  pub date_key:              i32,
  pub is_return:             bool,
  pub is_cancelled:          bool,
  pub is_complete:           bool,
  pub has_customer_id:       bool,
  pub has_valid_description: bool,
  pub is_valid_transaction:  bool,
}

impl CleanedRow {
  pub fn into_transaction(self) -> Result<CleanedTransaction> {
    Ok(CleanedTransaction {
      raw_id: decode_uuid(&self.raw_id)?,
      content_hash: self.content_hash,
      batch_id: self.batch_id,
      load_timestamp: decode_dt(&self.load_timestamp)?,
      invoice: self.invoice,
      stock_code: self.stock_code,
      description: self.description,
      quantity: self.quantity,
      unit_price: self.unit_price,
      invoiced_at: decode_naive_dt(&self.invoiced_at)?,
      customer_id: self.customer_id,
      country: self.country,
      line_total: self.line_total,
      date_key: self.date_key,
      is_return: self.is_return,
      is_cancelled: self.is_cancelled,
      flags: ValidityFlags {
        is_complete: self.is_complete,
        has_customer_id: self.has_customer_id,
        has_valid_description: self.has_valid_description,
        is_valid_transaction: self.is_valid_transaction,
      },
    })
  }
}

/// Raw values read directly from a `dim_product` row.
pub struct ProductRow {
  pub product_key:      i64,
  pub stock_code:       String,
  pub description:      String,
  pub category:         String,
  pub performance_tier: String,
  pub total_quantity:   i64,
  pub total_revenue:    f64,
  pub effective_date:   String,
  pub expiration_date:  Option<String>,
  pub is_current:       bool,
  pub version_number:   i64,
}

impl ProductRow {
  pub fn into_version(self) -> Result<ProductVersion> {
    Ok(DimensionVersion {
      surrogate_key: self.product_key,
      natural_key: self.stock_code,
      attributes: ProductAttributes {
        description: self.description,
        category: self.category,
        performance_tier: decode_tier(&self.performance_tier)?,
        total_quantity: self.total_quantity,
        total_revenue: self.total_revenue,
      },
      effective_date: decode_date(&self.effective_date)?,
      expiration_date: self
        .expiration_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      is_current: self.is_current,
      version_number: self.version_number,
    })
  }
}

/// Raw values read directly from a `dim_customer` row.
pub struct CustomerRow {
  pub customer_key:    i64,
  pub customer_id:     String,
  pub country:         Option<String>,
  pub segment:         String,
  pub total_orders:    i64,
  pub lifetime_value:  f64,
  pub first_purchase:  Option<String>,
  pub last_purchase:   Option<String>,
  pub effective_date:  String,
  pub expiration_date: Option<String>,
  pub is_current:      bool,
  pub version_number:  i64,
}

impl CustomerRow {
  pub fn into_version(self) -> Result<CustomerVersion> {
    Ok(DimensionVersion {
      surrogate_key: self.customer_key,
      natural_key: self.customer_id,
      attributes: CustomerAttributes {
        country: self.country,
        segment: decode_segment(&self.segment)?,
        total_orders: self.total_orders,
        lifetime_value: self.lifetime_value,
        first_purchase: self
          .first_purchase
          .as_deref()
          .map(decode_date)
          .transpose()?,
        last_purchase: self
          .last_purchase
          .as_deref()
          .map(decode_date)
          .transpose()?,
      },
      effective_date: decode_date(&self.effective_date)?,
      expiration_date: self
        .expiration_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      is_current: self.is_current,
      version_number: self.version_number,
    })
  }
}

/// Raw values read directly from a `fact_sales` row.
pub struct FactSalesRow {
  pub fact_id:        String,
  pub date_key:       i32,
  pub product_key:    i64,
  pub customer_key:   Option<i64>,
  pub invoice:        String,
  pub stock_code:     String,
  pub quantity:       i64,
  pub unit_price:     f64,
  pub line_total:     f64,
  pub discount:       f64,
  pub net_amount:     f64,
  pub is_return:      bool,
  pub is_cancelled:   bool,
  pub source_raw_id:  String,
  pub batch_id:       String,
  pub load_timestamp: String,
}

impl FactSalesRow {
  pub fn into_fact(self) -> Result<FactRow> {
    Ok(FactRow {
      fact_id: self.fact_id,
      date_key: self.date_key,
      product_key: self.product_key,
      customer_key: self.customer_key,
      invoice: self.invoice,
      stock_code: self.stock_code,
      quantity: self.quantity,
      unit_price: self.unit_price,
      line_total: self.line_total,
      discount: self.discount,
      net_amount: self.net_amount,
      is_return: self.is_return,
      is_cancelled: self.is_cancelled,
      source_raw_id: decode_uuid(&self.source_raw_id)?,
      batch_id: self.batch_id,
      load_timestamp: decode_dt(&self.load_timestamp)?,
    })
  }
}
