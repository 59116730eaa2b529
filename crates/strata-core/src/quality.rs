//! Quality scoring — completeness, validity, and consistency per layer.
//!
//! Scores are advisory: they are persisted for trend analysis and surfaced
//! to operators, but never block a merge by themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  clean::{CleanedTransaction, parse_price, parse_quantity, parse_timestamp},
  raw::RawRecord,
};

// ─── Layers and weights ──────────────────────────────────────────────────────

/// The warehouse tier a score applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
  Raw,
  Cleaned,
  Dimensional,
}

impl Layer {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Raw => "raw",
      Self::Cleaned => "cleaned",
      Self::Dimensional => "dimensional",
    }
  }
}

/// Relative weights for the overall score. Configuration, not policy:
/// callers may rebalance without touching the scoring functions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
  pub completeness: f64,
  pub validity:     f64,
  pub consistency:  f64,
}

impl Default for QualityWeights {
  fn default() -> Self {
    Self { completeness: 0.4, validity: 0.4, consistency: 0.2 }
  }
}

impl QualityWeights {
  /// Weighted combination, normalised so the weights need not sum to one.
  pub fn overall(&self, completeness: f64, validity: f64, consistency: f64) -> f64 {
    let total = self.completeness + self.validity + self.consistency;
    if total <= 0.0 {
      return 0.0;
    }
    (self.completeness * completeness
      + self.validity * validity
      + self.consistency * consistency)
      / total
  }
}

// ─── Checks and reports ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
  Pass,
  Fail,
}

impl CheckStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pass => "PASS",
      Self::Fail => "FAIL",
    }
  }
}

/// One referential or business-rule check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
  pub check_name:     String,
  pub table_name:     String,
  pub failed_records: u64,
  pub total_records:  u64,
  pub failure_pct:    f64,
  pub status:         CheckStatus,
}

impl QualityCheck {
  pub fn new(check_name: &str, table_name: &str, failed: u64, total: u64) -> Self {
    let failure_pct = if total == 0 { 0.0 } else { failed as f64 / total as f64 * 100.0 };
    Self {
      check_name: check_name.to_owned(),
      table_name: table_name.to_owned(),
      failed_records: failed,
      total_records: total,
      failure_pct,
      status: if failed == 0 { CheckStatus::Pass } else { CheckStatus::Fail },
    }
  }
}

/// Scores plus the individual check rows for one layer of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
  pub batch_id:     String,
  pub layer:        Layer,
  pub completeness: f64,
  pub validity:     f64,
  pub consistency:  f64,
  pub overall:      f64,
  pub checks:       Vec<QualityCheck>,
  pub measured_at:  DateTime<Utc>,
}

impl QualityReport {
  fn build(
    batch_id: &str,
    layer: Layer,
    completeness: f64,
    validity: f64,
    consistency: f64,
    checks: Vec<QualityCheck>,
    weights: &QualityWeights,
  ) -> Self {
    Self {
      batch_id: batch_id.to_owned(),
      layer,
      completeness,
      validity,
      consistency,
      overall: weights.overall(completeness, validity, consistency),
      checks,
      measured_at: Utc::now(),
    }
  }
}

// ─── Raw layer ───────────────────────────────────────────────────────────────

/// Score one batch of the raw landing tier.
///
/// Completeness counts populated cells across the critical columns;
/// validity applies the business predicates to the raw text; consistency is
/// one minus the duplicate-fingerprint rate. The stored rows are already
/// deduplicated at landing, so `landing_duplicates` (the count of source
/// rows skipped by the fingerprint check) reconstructs the true rate.
pub fn score_raw(
  batch_id: &str,
  records: &[RawRecord],
  landing_duplicates: u64,
  weights: &QualityWeights,
) -> QualityReport {
  use std::collections::BTreeMap;

  let total = records.len() as u64;
  let critical_columns = 6u64; // invoice, stock_code, quantity, date, price, country

  let mut populated_cells = 0u64;
  let mut valid_rows = 0u64;
  let mut fingerprints: BTreeMap<&str, u64> = BTreeMap::new();

  for record in records {
    let row = &record.row;
    let present = |field: &Option<String>| {
      field.as_deref().is_some_and(|v| !v.trim().is_empty()) as u64
    };
    populated_cells += present(&row.invoice)
      + present(&row.stock_code)
      + present(&row.quantity)
      + present(&row.invoice_date)
      + present(&row.unit_price)
      + present(&row.country);

    let quantity = parse_quantity(row.quantity.as_ref());
    let price = parse_price(row.unit_price.as_ref());
    let valid = present(&row.invoice) == 1
      && present(&row.stock_code) == 1
      && parse_timestamp(row.invoice_date.as_ref()).is_some()
      && quantity.is_some_and(|q| q != 0)
      && price.is_some_and(|p| p >= 0.0);
    valid_rows += valid as u64;

    *fingerprints.entry(record.content_hash.as_str()).or_default() += 1;
  }

  let duplicates: u64 = landing_duplicates
    + fingerprints.values().map(|&n| n.saturating_sub(1)).sum::<u64>();
  // Every source row seen for this batch, including the deduplicated ones.
  let seen = total + landing_duplicates;

  let (completeness, validity, consistency) = if total == 0 {
    (1.0, 1.0, if seen == 0 { 1.0 } else { 0.0 })
  } else {
    (
      populated_cells as f64 / (total * critical_columns) as f64,
      valid_rows as f64 / total as f64,
      1.0 - duplicates as f64 / seen as f64,
    )
  };

  let checks = vec![
    QualityCheck::new("raw_business_rules", "raw_records", total - valid_rows, total),
    QualityCheck::new("raw_duplicate_fingerprints", "raw_records", duplicates, seen),
  ];

  QualityReport::build(batch_id, Layer::Raw, completeness, validity, consistency, checks, weights)
}

// ─── Cleaned layer ───────────────────────────────────────────────────────────

/// Score one batch of the cleaned tier. `hard_rejects` is the number of raw
/// rows the cleaning stage excluded for this batch.
pub fn score_cleaned(
  batch_id: &str,
  kept: &[CleanedTransaction],
  hard_rejects: u64,
  weights: &QualityWeights,
) -> QualityReport {
  let total = kept.len() as u64;
  let complete = kept.iter().filter(|t| t.flags.is_complete).count() as u64;
  let valid = kept.iter().filter(|t| t.flags.is_valid_transaction).count() as u64;

  let processed = total + hard_rejects;
  let (completeness, validity, consistency) = if total == 0 {
    (1.0, 1.0, if processed == 0 { 1.0 } else { 0.0 })
  } else {
    (
      complete as f64 / total as f64,
      valid as f64 / total as f64,
      // The cleaned view is 1:1 with surviving raw rows; inconsistency here
      // is the hard-reject rate.
      total as f64 / processed as f64,
    )
  };

  let checks = vec![
    QualityCheck::new("cleaned_complete_rows", "cleaned_transactions", total - complete, total),
    QualityCheck::new("cleaned_valid_sales", "cleaned_transactions", total - valid, total),
    QualityCheck::new("cleaned_hard_rejects", "cleaned_transactions", hard_rejects, processed),
  ];

  QualityReport::build(
    batch_id,
    Layer::Cleaned,
    completeness,
    validity,
    consistency,
    checks,
    weights,
  )
}

// ─── Dimensional layer ───────────────────────────────────────────────────────

/// Audit counts over the dimensional tier, gathered by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseAudit {
  pub fact_count:                  u64,
  pub orphan_product_facts:        u64,
  pub orphan_date_facts:           u64,
  pub orphan_customer_facts:       u64,
  pub measure_mismatch_facts:      u64,
  /// Natural keys with more than one current version — a corruption fault
  /// requiring an explicit repair pass, never auto-resolved.
  pub duplicate_current_products:  Vec<String>,
  pub duplicate_current_customers: Vec<String>,
}

/// Score the dimensional tier from a warehouse audit.
pub fn score_dimensional(
  batch_id: &str,
  audit: &WarehouseAudit,
  weights: &QualityWeights,
) -> QualityReport {
  let facts = audit.fact_count;
  let referential_violations =
    audit.orphan_product_facts + audit.orphan_date_facts + audit.orphan_customer_facts;
  let dup_currents =
    (audit.duplicate_current_products.len() + audit.duplicate_current_customers.len()) as u64;

  let rate = |failed: u64| {
    if facts == 0 { 0.0 } else { failed as f64 / facts as f64 }
  };
  let completeness = 1.0 - rate(audit.orphan_customer_facts);
  let validity = 1.0 - rate(audit.measure_mismatch_facts);
  let consistency = if dup_currents > 0 {
    0.0
  } else {
    1.0 - rate(referential_violations)
  };

  let checks = vec![
    QualityCheck::new("fact_product_key_resolves", "fact_sales", audit.orphan_product_facts, facts),
    QualityCheck::new("fact_date_key_resolves", "fact_sales", audit.orphan_date_facts, facts),
    QualityCheck::new("fact_customer_key_resolves", "fact_sales", audit.orphan_customer_facts, facts),
    QualityCheck::new("fact_measure_consistency", "fact_sales", audit.measure_mismatch_facts, facts),
    QualityCheck::new(
      "single_current_product_version",
      "dim_product",
      audit.duplicate_current_products.len() as u64,
      facts.max(1),
    ),
    QualityCheck::new(
      "single_current_customer_version",
      "dim_customer",
      audit.duplicate_current_customers.len() as u64,
      facts.max(1),
    ),
  ];

  QualityReport::build(
    batch_id,
    Layer::Dimensional,
    completeness,
    validity,
    consistency,
    checks,
    weights,
  )
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::raw::{RawRecord, RawRow};

  fn raw(invoice: &str, quantity: &str, price: &str) -> RawRecord {
    RawRecord::stamp(
      RawRow {
        invoice: Some(invoice.into()),
        stock_code: Some("85123A".into()),
        description: Some("WHITE HANGER".into()),
        quantity: Some(quantity.into()),
        invoice_date: Some("2010-12-01 08:26".into()),
        unit_price: Some(price.into()),
        customer_id: Some("17850".into()),
        country: Some("United Kingdom".into()),
      },
      "test.csv",
      "BATCH_TEST",
      Utc::now(),
    )
  }

  #[test]
  fn overall_is_weighted_and_normalised() {
    let weights = QualityWeights { completeness: 2.0, validity: 1.0, consistency: 1.0 };
    let overall = weights.overall(1.0, 0.5, 0.5);
    assert!((overall - 0.75).abs() < 1e-9);
  }

  #[test]
  fn score_raw_flags_duplicates_and_invalid_rows() {
    let a = raw("536365", "6", "2.55");
    let b = raw("536365", "6", "2.55"); // identical natural content, same hash
    let c = raw("536366", "0", "2.55"); // zero quantity fails validity

    let report = score_raw("BATCH_TEST", &[a, b, c], 0, &QualityWeights::default());
    assert!((report.consistency - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    assert!((report.validity - (2.0 / 3.0)).abs() < 1e-9);
    assert_eq!(report.completeness, 1.0);
    assert!(report.checks.iter().any(|c| c.status == CheckStatus::Fail));
  }

  #[test]
  fn landing_duplicates_count_against_consistency() {
    // Two rows landed, one skipped at landing as a fingerprint duplicate:
    // three rows seen, one duplicate.
    let a = raw("536365", "6", "2.55");
    let b = raw("536366", "4", "1.25");

    let report = score_raw("BATCH_TEST", &[a, b], 1, &QualityWeights::default());
    assert!((report.consistency - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    let dup_check = report
      .checks
      .iter()
      .find(|c| c.check_name == "raw_duplicate_fingerprints")
      .unwrap();
    assert_eq!(dup_check.failed_records, 1);
    assert_eq!(dup_check.total_records, 3);
  }

  #[test]
  fn empty_batch_scores_perfect() {
    let report = score_raw("BATCH_EMPTY", &[], 0, &QualityWeights::default());
    assert_eq!(report.overall, 1.0);
  }

  #[test]
  fn duplicate_current_versions_zero_the_consistency_score() {
    let audit = WarehouseAudit {
      fact_count: 10,
      duplicate_current_products: vec!["85123A".into()],
      ..Default::default()
    };
    let report = score_dimensional("BATCH_TEST", &audit, &QualityWeights::default());
    assert_eq!(report.consistency, 0.0);
    assert!(
      report
        .checks
        .iter()
        .any(|c| c.check_name == "single_current_product_version"
          && c.status == CheckStatus::Fail)
    );
  }
}
