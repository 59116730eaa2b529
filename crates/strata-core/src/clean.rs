//! Cleaning & validation — the typed view over the raw tier.
//!
//! [`clean`] is a pure function from one raw record to either a
//! [`CleanedTransaction`] or a hard reject with a reason code. It never
//! errors: a field that fails to coerce becomes `None` and the record is
//! downgraded to invalid instead of dropped, unless it trips one of the
//! explicit hard-reject rules.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::raw::RawRecord;

/// Invoice identifiers carrying this prefix mark cancelled transactions in
/// the source system.
const CANCELLATION_MARKER: char = 'C';

// ─── Config ──────────────────────────────────────────────────────────────────

/// Tunable bounds for the cleaning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
  /// Rows with `|quantity|` above this bound are hard-rejected as entry
  /// errors rather than passed through to skew the fact table.
  pub max_abs_quantity: i64,
}

impl Default for CleaningConfig {
  fn default() -> Self {
    Self { max_abs_quantity: 10_000 }
  }
}

// ─── Validity flags ──────────────────────────────────────────────────────────

/// Non-exclusive classification flags; a row can fail several at once and
/// still be retained in the cleaned view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityFlags {
  /// All eight natural fields present and coercible.
  pub is_complete:           bool,
  pub has_customer_id:       bool,
  /// Description is non-empty and contains at least one letter.
  pub has_valid_description: bool,
  /// A "valid sale": positive quantity, non-negative price, not cancelled.
  /// Returns and cancellations are retained but excluded from this flag.
  pub is_valid_transaction:  bool,
}

// ─── CleanedTransaction ──────────────────────────────────────────────────────

/// One typed, validated transaction derived from exactly one raw record.
///
/// Logically a view: recomputed on each run, never mutated in place. The
/// back-reference (`raw_id`, `content_hash`) carries lineage forward into
/// the fact tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedTransaction {
  pub raw_id:         Uuid,
  pub content_hash:   String,
  pub batch_id:       String,
  pub load_timestamp: DateTime<Utc>,

  pub invoice:     String,
  pub stock_code:  String,
  pub description: Option<String>,
  /// `None` when the raw value failed to parse (record kept, invalid).
  pub quantity:    Option<i64>,
  /// `None` when the raw value failed to parse (record kept, invalid).
  pub unit_price:  Option<f64>,
  pub invoiced_at: NaiveDateTime,
  pub customer_id: Option<String>,
  pub country:     Option<String>,

  /// `quantity × unit_price`, rounded to cents; `None` if either side is.
  pub line_total:   Option<f64>,
  /// Integer `yyyymmdd` key into the date dimension.
  pub date_key:     i32,
  pub is_return:    bool,
  pub is_cancelled: bool,
  pub flags:        ValidityFlags,
}

impl CleanedTransaction {
  pub fn invoice_date(&self) -> NaiveDate {
    self.invoiced_at.date()
  }
}

// ─── Reject reasons ──────────────────────────────────────────────────────────

/// Hard-reject rules: rows matching any of these are excluded from the
/// cleaned view entirely, with the reason accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
  MissingInvoice,
  MissingStockCode,
  UnparseableTimestamp,
  ZeroQuantity,
  QuantityOutOfBounds,
  NegativeUnitPrice,
}

impl RejectReason {
  /// Stable reason code for logs and quality metrics.
  pub fn code(self) -> &'static str {
    match self {
      Self::MissingInvoice => "missing_invoice",
      Self::MissingStockCode => "missing_stock_code",
      Self::UnparseableTimestamp => "unparseable_timestamp",
      Self::ZeroQuantity => "zero_quantity",
      Self::QuantityOutOfBounds => "quantity_out_of_bounds",
      Self::NegativeUnitPrice => "negative_unit_price",
    }
  }
}

/// Result of cleaning one raw record.
#[derive(Debug, Clone)]
pub enum CleanOutcome {
  Kept(CleanedTransaction),
  Rejected { raw_id: Uuid, reason: RejectReason },
}

// ─── Coercion helpers ────────────────────────────────────────────────────────

/// Trim a raw field; empty and literal-null markers coerce to `None`.
pub fn canonical_text(field: Option<&String>) -> Option<String> {
  let trimmed = field?.trim();
  if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed.eq_ignore_ascii_case("null")
  {
    None
  } else {
    Some(trimmed.to_owned())
  }
}

/// Defensive integer parse; accepts a float representation with a zero
/// fractional part (sources export quantities as `6.0`).
pub fn parse_quantity(field: Option<&String>) -> Option<i64> {
  let text = canonical_text(field)?;
  if let Ok(q) = text.parse::<i64>() {
    return Some(q);
  }
  let f = text.parse::<f64>().ok()?;
  if f.is_finite() && f.fract() == 0.0 { Some(f as i64) } else { None }
}

/// Defensive price parse.
pub fn parse_price(field: Option<&String>) -> Option<f64> {
  let text = canonical_text(field)?;
  let f = text.parse::<f64>().ok()?;
  f.is_finite().then_some(f)
}

/// Timestamp formats observed in the source exports, most common first.
const TIMESTAMP_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%m/%d/%Y %H:%M",
  "%d/%m/%Y %H:%M",
];

/// Defensive timestamp parse; date-only values land at midnight.
pub fn parse_timestamp(field: Option<&String>) -> Option<NaiveDateTime> {
  let text = canonical_text(field)?;
  for format in TIMESTAMP_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, format) {
      return Some(dt);
    }
  }
  NaiveDate::parse_from_str(&text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Round a monetary amount to cents. All derived measures go through this so
/// that re-runs produce bitwise-identical values.
pub fn round_to_cents(amount: f64) -> f64 {
  (amount * 100.0).round() / 100.0
}

/// Integer `yyyymmdd` date key used across the dimensional tier.
pub fn date_key(date: NaiveDate) -> i32 {
  use chrono::Datelike;
  date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

// ─── clean ───────────────────────────────────────────────────────────────────

/// Derive the cleaned transaction for one raw record.
///
/// Pure and deterministic: the same record and config always produce the
/// same outcome, which is what makes the stage safely re-runnable and
/// shardable across workers.
pub fn clean(record: &RawRecord, config: &CleaningConfig) -> CleanOutcome {
  let reject = |reason| CleanOutcome::Rejected { raw_id: record.record_id, reason };

  let Some(invoice) = canonical_text(record.row.invoice.as_ref()) else {
    return reject(RejectReason::MissingInvoice);
  };
  let Some(stock_code) = canonical_text(record.row.stock_code.as_ref()) else {
    return reject(RejectReason::MissingStockCode);
  };
  let Some(invoiced_at) = parse_timestamp(record.row.invoice_date.as_ref()) else {
    return reject(RejectReason::UnparseableTimestamp);
  };

  let quantity = parse_quantity(record.row.quantity.as_ref());
  let unit_price = parse_price(record.row.unit_price.as_ref());

  if quantity == Some(0) {
    return reject(RejectReason::ZeroQuantity);
  }
  if let Some(q) = quantity
    && q.abs() > config.max_abs_quantity
  {
    return reject(RejectReason::QuantityOutOfBounds);
  }
  if let Some(p) = unit_price
    && p < 0.0
  {
    return reject(RejectReason::NegativeUnitPrice);
  }

  let stock_code = stock_code.to_uppercase();
  let description = canonical_text(record.row.description.as_ref());
  let customer_id = canonical_text(record.row.customer_id.as_ref());
  let country = canonical_text(record.row.country.as_ref());

  let is_cancelled =
    invoice.starts_with([CANCELLATION_MARKER, CANCELLATION_MARKER.to_ascii_lowercase()]);
  let is_return = quantity.is_some_and(|q| q < 0);
  let line_total = match (quantity, unit_price) {
    (Some(q), Some(p)) => Some(round_to_cents(q as f64 * p)),
    _ => None,
  };

  let has_valid_description = description
    .as_deref()
    .is_some_and(|d| d.chars().any(|c| c.is_alphabetic()));

  let flags = ValidityFlags {
    is_complete: description.is_some()
      && quantity.is_some()
      && unit_price.is_some()
      && customer_id.is_some()
      && country.is_some(),
    has_customer_id: customer_id.is_some(),
    has_valid_description,
    is_valid_transaction: quantity.is_some_and(|q| q > 0)
      && unit_price.is_some_and(|p| p >= 0.0)
      && !is_cancelled,
  };

  CleanOutcome::Kept(CleanedTransaction {
    raw_id: record.record_id,
    content_hash: record.content_hash.clone(),
    batch_id: record.batch_id.clone(),
    load_timestamp: record.load_timestamp,
    invoice,
    stock_code,
    description,
    quantity,
    unit_price,
    invoiced_at,
    customer_id,
    country,
    line_total,
    date_key: date_key(invoiced_at.date()),
    is_return,
    is_cancelled,
    flags,
  })
}
