//! Slowly-changing dimension types and the pure derivations behind them.
//!
//! Dimension entities follow type-2 versioning: a natural key accumulates a
//! chain of time-bounded versions, exactly one of which is current at any
//! instant. Prior versions are closed (expiration date set), never deleted.
//!
//! Category, tier, and segment derivations are pure functions of the
//! aggregated metrics and are recomputed, not carried forward, on every
//! maintenance run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clean::{CleanedTransaction, round_to_cents};

/// Description sentinel for products observed in transactions but never with
/// a usable description. Total coverage requires a dimension row anyway.
pub const UNKNOWN_PRODUCT: &str = "UNKNOWN PRODUCT";

// ─── DimensionVersion ────────────────────────────────────────────────────────

/// One time-bounded version of a dimension entity.
///
/// Invariant: per natural key, at most one version has `is_current = true`,
/// and that version has `expiration_date = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionVersion<A> {
  pub surrogate_key:   i64,
  pub natural_key:     String,
  pub attributes:      A,
  pub effective_date:  NaiveDate,
  pub expiration_date: Option<NaiveDate>,
  pub is_current:      bool,
  pub version_number:  i64,
}

pub type ProductVersion = DimensionVersion<ProductAttributes>;
pub type CustomerVersion = DimensionVersion<CustomerAttributes>;

// ─── Product ─────────────────────────────────────────────────────────────────

/// Lifetime-revenue tier; recomputed from the aggregated metrics each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
  /// No valid sales observed yet.
  New,
  Low,
  Medium,
  High,
}

impl PerformanceTier {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
    }
  }
}

pub fn performance_tier(total_revenue: f64) -> PerformanceTier {
  if total_revenue >= 10_000.0 {
    PerformanceTier::High
  } else if total_revenue >= 1_000.0 {
    PerformanceTier::Medium
  } else if total_revenue > 0.0 {
    PerformanceTier::Low
  } else {
    PerformanceTier::New
  }
}

/// Keyword rules mapping a product description to a coarse category.
/// First match wins; order is therefore part of the contract.
const CATEGORY_RULES: &[(&str, &str)] = &[
  ("CHRISTMAS", "Seasonal"),
  ("EASTER", "Seasonal"),
  ("CANDLE", "Candles"),
  ("LANTERN", "Lighting"),
  ("LIGHT", "Lighting"),
  ("LAMP", "Lighting"),
  ("BAG", "Bags"),
  ("BOX", "Storage"),
  ("JAR", "Storage"),
  ("MUG", "Kitchenware"),
  ("CUP", "Kitchenware"),
  ("PLATE", "Kitchenware"),
  ("BOWL", "Kitchenware"),
  ("TEAPOT", "Kitchenware"),
  ("CARD", "Stationery"),
  ("PAPER", "Stationery"),
  ("WRAP", "Stationery"),
  ("HEART", "Decor"),
  ("SIGN", "Decor"),
  ("FRAME", "Decor"),
  ("ORNAMENT", "Decor"),
];

pub fn product_category(description: &str) -> &'static str {
  if description == UNKNOWN_PRODUCT {
    return "Unknown";
  }
  let upper = description.to_uppercase();
  for (keyword, category) in CATEGORY_RULES {
    if upper.contains(keyword) {
      return category;
    }
  }
  "General"
}

/// Tracked attributes of the product dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttributes {
  pub description:      String,
  pub category:         String,
  pub performance_tier: PerformanceTier,
  pub total_quantity:   i64,
  pub total_revenue:    f64,
}

/// Per-stock-code aggregate observed in one maintenance run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductObservation {
  pub description:    Option<String>,
  pub total_quantity: i64,
  pub total_revenue:  f64,
}

impl ProductAttributes {
  /// Derive the full attribute set from one run's observation. Metrics are
  /// summed over valid sales only; description falls back to the sentinel.
  pub fn from_observation(obs: &ProductObservation) -> Self {
    let description = obs
      .description
      .clone()
      .unwrap_or_else(|| UNKNOWN_PRODUCT.to_owned());
    let total_revenue = round_to_cents(obs.total_revenue);
    Self {
      category: product_category(&description).to_owned(),
      performance_tier: performance_tier(total_revenue),
      description,
      total_quantity: obs.total_quantity,
      total_revenue,
    }
  }
}

/// Aggregate the cleaned view into one observation per stock code.
///
/// Every distinct stock code appears in the result, including those with no
/// valid sales yet — the total-coverage rule that keeps fact rows from
/// orphaning on the product join. `BTreeMap` keeps iteration deterministic.
pub fn product_rollup(
  transactions: &[CleanedTransaction],
) -> BTreeMap<String, ProductObservation> {
  // Track recency so the most recently invoiced description wins; the hash
  // breaks exact-timestamp ties deterministically.
  let mut seen_at: BTreeMap<String, (chrono::NaiveDateTime, String)> = BTreeMap::new();
  let mut rollup: BTreeMap<String, ProductObservation> = BTreeMap::new();

  for txn in transactions {
    let entry = rollup.entry(txn.stock_code.clone()).or_default();

    if txn.flags.has_valid_description
      && let Some(desc) = &txn.description
    {
      let candidate = (txn.invoiced_at, txn.content_hash.clone());
      let replace = seen_at
        .get(&txn.stock_code)
        .is_none_or(|best| candidate > *best);
      if replace {
        seen_at.insert(txn.stock_code.clone(), candidate);
        entry.description = Some(desc.clone());
      }
    }

    if txn.flags.is_valid_transaction {
      entry.total_quantity += txn.quantity.unwrap_or(0);
      entry.total_revenue += txn.line_total.unwrap_or(0.0);
    }
  }

  for obs in rollup.values_mut() {
    obs.total_revenue = round_to_cents(obs.total_revenue);
  }
  rollup
}

// ─── Customer ────────────────────────────────────────────────────────────────

/// Order-frequency/value segment; recomputed from the metrics each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
  /// Known customer id, no valid orders yet.
  Prospect,
  OneTime,
  Repeat,
  Loyal,
  Vip,
}

impl CustomerSegment {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Prospect => "prospect",
      Self::OneTime => "one_time",
      Self::Repeat => "repeat",
      Self::Loyal => "loyal",
      Self::Vip => "vip",
    }
  }
}

pub fn customer_segment(total_orders: i64, lifetime_value: f64) -> CustomerSegment {
  match total_orders {
    0 => CustomerSegment::Prospect,
    1 => CustomerSegment::OneTime,
    2..=4 => CustomerSegment::Repeat,
    _ if total_orders >= 10 && lifetime_value >= 5_000.0 => CustomerSegment::Vip,
    _ => CustomerSegment::Loyal,
  }
}

/// Tracked attributes of the customer dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAttributes {
  pub country:        Option<String>,
  pub segment:        CustomerSegment,
  /// Distinct invoices among valid sales.
  pub total_orders:   i64,
  pub lifetime_value: f64,
  pub first_purchase: Option<NaiveDate>,
  pub last_purchase:  Option<NaiveDate>,
}

/// Aggregate the cleaned view into one attribute snapshot per customer id.
///
/// When a customer id carries several conflicting countries in the same run,
/// the country with the most orders wins, then the highest value, then the
/// lexicographically smallest name — an explicit deterministic tie-break.
pub fn customer_rollup(
  transactions: &[CleanedTransaction],
) -> BTreeMap<String, CustomerAttributes> {
  use std::collections::BTreeSet;

  #[derive(Default)]
  struct Acc {
    invoices:        BTreeSet<String>,
    lifetime_value:  f64,
    first_purchase:  Option<NaiveDate>,
    last_purchase:   Option<NaiveDate>,
    // country -> (distinct orders, value) for the conflict heuristic
    country_orders:  BTreeMap<String, BTreeSet<String>>,
    country_value:   BTreeMap<String, f64>,
  }

  let mut acc: BTreeMap<String, Acc> = BTreeMap::new();

  for txn in transactions {
    let Some(customer_id) = &txn.customer_id else { continue };
    let entry = acc.entry(customer_id.clone()).or_default();

    if !txn.flags.is_valid_transaction {
      continue;
    }

    entry.invoices.insert(txn.invoice.clone());
    entry.lifetime_value += txn.line_total.unwrap_or(0.0);

    let date = txn.invoice_date();
    entry.first_purchase = Some(entry.first_purchase.map_or(date, |d| d.min(date)));
    entry.last_purchase = Some(entry.last_purchase.map_or(date, |d| d.max(date)));

    if let Some(country) = &txn.country {
      entry
        .country_orders
        .entry(country.clone())
        .or_default()
        .insert(txn.invoice.clone());
      *entry.country_value.entry(country.clone()).or_default() +=
        txn.line_total.unwrap_or(0.0);
    }
  }

  acc
    .into_iter()
    .map(|(customer_id, a)| {
      let country = a
        .country_orders
        .iter()
        .map(|(name, orders)| {
          let value = a.country_value.get(name).copied().unwrap_or(0.0);
          (name.clone(), orders.len(), value)
        })
        // Most orders, then highest value, then lexicographically smallest.
        .max_by(|(name_a, orders_a, value_a), (name_b, orders_b, value_b)| {
          orders_a
            .cmp(orders_b)
            .then(value_a.total_cmp(value_b))
            .then(name_b.cmp(name_a))
        })
        .map(|(name, _, _)| name);

      let total_orders = a.invoices.len() as i64;
      let lifetime_value = round_to_cents(a.lifetime_value);
      let attributes = CustomerAttributes {
        country,
        segment: customer_segment(total_orders, lifetime_value),
        total_orders,
        lifetime_value,
        first_purchase: a.first_purchase,
        last_purchase: a.last_purchase,
      };
      (customer_id, attributes)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::clean::ValidityFlags;

  fn txn(
    invoice: &str,
    stock_code: &str,
    description: Option<&str>,
    quantity: i64,
    unit_price: f64,
    customer_id: Option<&str>,
    country: Option<&str>,
  ) -> CleanedTransaction {
    let invoiced_at = NaiveDate::from_ymd_opt(2010, 12, 1)
      .unwrap()
      .and_hms_opt(8, 26, 0)
      .unwrap();
    let valid = quantity > 0 && unit_price >= 0.0;
    CleanedTransaction {
      raw_id: Uuid::new_v4(),
      content_hash: format!("{invoice}-{stock_code}-{quantity}"),
      batch_id: "BATCH_TEST".into(),
      load_timestamp: Utc::now(),
      invoice: invoice.into(),
      stock_code: stock_code.into(),
      description: description.map(Into::into),
      quantity: Some(quantity),
      unit_price: Some(unit_price),
      invoiced_at,
      customer_id: customer_id.map(Into::into),
      country: country.map(Into::into),
      line_total: Some(round_to_cents(quantity as f64 * unit_price)),
      date_key: 20101201,
      is_return: quantity < 0,
      is_cancelled: false,
      flags: ValidityFlags {
        is_complete: true,
        has_customer_id: customer_id.is_some(),
        has_valid_description: description.is_some(),
        is_valid_transaction: valid,
      },
    }
  }

  #[test]
  fn tier_thresholds() {
    assert_eq!(performance_tier(0.0), PerformanceTier::New);
    assert_eq!(performance_tier(999.99), PerformanceTier::Low);
    assert_eq!(performance_tier(1_000.0), PerformanceTier::Medium);
    assert_eq!(performance_tier(10_000.0), PerformanceTier::High);
  }

  #[test]
  fn category_keyword_rules() {
    // LIGHT outranks HEART in the rule order.
    assert_eq!(product_category("RED HANGING HEART T-LIGHT HOLDER"), "Lighting");
    assert_eq!(product_category("JUMBO BAG RED RETROSPOT"), "Bags");
    assert_eq!(product_category("CHRISTMAS CRAFT HEART DECORATIONS"), "Seasonal");
    assert_eq!(product_category(UNKNOWN_PRODUCT), "Unknown");
    assert_eq!(product_category("ASSORTED COLOUR BIRD"), "General");
  }

  #[test]
  fn segment_thresholds() {
    assert_eq!(customer_segment(0, 0.0), CustomerSegment::Prospect);
    assert_eq!(customer_segment(1, 50.0), CustomerSegment::OneTime);
    assert_eq!(customer_segment(3, 500.0), CustomerSegment::Repeat);
    assert_eq!(customer_segment(6, 1_000.0), CustomerSegment::Loyal);
    assert_eq!(customer_segment(12, 9_000.0), CustomerSegment::Vip);
    // High frequency but low value stays loyal.
    assert_eq!(customer_segment(12, 500.0), CustomerSegment::Loyal);
  }

  #[test]
  fn product_rollup_covers_invalid_only_stock_codes() {
    let mut returned = txn("C1", "85123A", Some("WHITE HANGER"), -2, 2.55, None, None);
    returned.is_cancelled = true;
    returned.flags.is_valid_transaction = false;

    let rollup = product_rollup(&[returned]);
    let obs = rollup.get("85123A").expect("total coverage");
    assert_eq!(obs.total_quantity, 0);
    assert_eq!(obs.total_revenue, 0.0);
    assert_eq!(obs.description.as_deref(), Some("WHITE HANGER"));

    let attrs = ProductAttributes::from_observation(obs);
    assert_eq!(attrs.performance_tier, PerformanceTier::New);
  }

  #[test]
  fn product_rollup_sums_valid_sales_only() {
    let rows = vec![
      txn("1", "85123A", Some("WHITE HANGER"), 6, 2.55, Some("17850"), Some("United Kingdom")),
      txn("2", "85123A", Some("WHITE HANGER"), 4, 2.55, Some("17850"), Some("United Kingdom")),
      txn("3", "85123A", Some("WHITE HANGER"), -2, 2.55, Some("17850"), Some("United Kingdom")),
    ];
    let rollup = product_rollup(&rows);
    let obs = &rollup["85123A"];
    assert_eq!(obs.total_quantity, 10);
    assert_eq!(obs.total_revenue, 25.50);
  }

  #[test]
  fn customer_rollup_country_conflict_is_deterministic() {
    let rows = vec![
      txn("1", "A", Some("X"), 1, 10.0, Some("17850"), Some("France")),
      txn("2", "A", Some("X"), 1, 10.0, Some("17850"), Some("Germany")),
      txn("3", "A", Some("X"), 1, 10.0, Some("17850"), Some("Germany")),
    ];
    let rollup = customer_rollup(&rows);
    let attrs = &rollup["17850"];
    assert_eq!(attrs.country.as_deref(), Some("Germany"));
    assert_eq!(attrs.total_orders, 3);

    // Equal order counts and values: lexicographically smallest wins.
    let tied = vec![
      txn("1", "A", Some("X"), 1, 10.0, Some("17850"), Some("Portugal")),
      txn("2", "A", Some("X"), 1, 10.0, Some("17850"), Some("France")),
    ];
    let rollup = customer_rollup(&tied);
    assert_eq!(rollup["17850"].country.as_deref(), Some("France"));
  }

  #[test]
  fn customer_rollup_skips_anonymous_and_invalid_rows() {
    let mut cancelled = txn("C9", "A", Some("X"), 5, 10.0, Some("17850"), Some("France"));
    cancelled.flags.is_valid_transaction = false;
    let rows = vec![
      txn("1", "A", Some("X"), 1, 10.0, None, Some("France")),
      cancelled,
    ];
    let rollup = customer_rollup(&rows);
    let attrs = &rollup["17850"];
    assert_eq!(attrs.total_orders, 0);
    assert_eq!(attrs.segment, CustomerSegment::Prospect);
    assert_eq!(attrs.lifetime_value, 0.0);
  }
}
