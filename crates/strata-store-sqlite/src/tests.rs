//! Integration tests for `SqliteWarehouse` against an in-memory database.

use chrono::{NaiveDate, TimeZone, Utc};
use strata_core::{
  calendar::build_calendar,
  clean::{CleanOutcome, CleaningConfig, clean},
  dimension::{
    CustomerAttributes, CustomerSegment, PerformanceTier, ProductAttributes,
  },
  fact::FactRow,
  raw::{BatchClose, BatchStatus, IngestionBatch, RawRecord, RawRow},
  store::WarehouseStore,
};

use crate::SqliteWarehouse;

async fn store() -> SqliteWarehouse {
  SqliteWarehouse::open_in_memory()
    .await
    .expect("in-memory warehouse")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_row(invoice: &str, stock_code: &str, quantity: &str) -> RawRow {
  RawRow {
    invoice: Some(invoice.into()),
    stock_code: Some(stock_code.into()),
    description: Some("WHITE HANGING HEART T-LIGHT HOLDER".into()),
    quantity: Some(quantity.into()),
    invoice_date: Some("2010-12-01 08:26".into()),
    unit_price: Some("2.55".into()),
    customer_id: Some("17850".into()),
    country: Some("United Kingdom".into()),
  }
}

async fn open_batch(s: &SqliteWarehouse, batch_id: &str) {
  s.begin_batch(IngestionBatch::open(batch_id, "retail.json", Utc::now()))
    .await
    .unwrap();
}

fn product_attrs(revenue: f64) -> ProductAttributes {
  ProductAttributes {
    description: "WHITE HANGING HEART T-LIGHT HOLDER".into(),
    category: "Lighting".into(),
    performance_tier: strata_core::dimension::performance_tier(revenue),
    total_quantity: 6,
    total_revenue: revenue,
  }
}

fn customer_attrs(orders: i64, value: f64) -> CustomerAttributes {
  CustomerAttributes {
    country: Some("United Kingdom".into()),
    segment: strata_core::dimension::customer_segment(orders, value),
    total_orders: orders,
    lifetime_value: value,
    first_purchase: Some(day(2010, 12, 1)),
    last_purchase: Some(day(2010, 12, 1)),
  }
}

// ─── Batch log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_roundtrip_and_lifecycle() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  let fetched = s.get_batch("BATCH_1".into()).await.unwrap().unwrap();
  assert_eq!(fetched.status, BatchStatus::Started);
  assert!(fetched.ended_at.is_none());

  s.transition_batch("BATCH_1".into(), BatchStatus::Running, None, None)
    .await
    .unwrap();
  s.transition_batch(
    "BATCH_1".into(),
    BatchStatus::Success,
    Some(BatchClose {
      records_processed: 5,
      records_inserted:  4,
      records_failed:    1,
    }),
    None,
  )
  .await
  .unwrap();

  let closed = s.get_batch("BATCH_1".into()).await.unwrap().unwrap();
  assert_eq!(closed.status, BatchStatus::Success);
  assert_eq!(closed.records_processed, 5);
  assert_eq!(closed.records_inserted, 4);
  assert_eq!(closed.records_failed, 1);
  assert!(closed.ended_at.is_some());
}

#[tokio::test]
async fn terminal_batch_rejects_further_transitions() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  s.transition_batch(
    "BATCH_1".into(),
    BatchStatus::Failed,
    None,
    Some("source unreadable".into()),
  )
  .await
  .unwrap();

  let err = s
    .transition_batch("BATCH_1".into(), BatchStatus::Running, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::BatchTerminal(..))
  ));

  let batch = s.get_batch("BATCH_1".into()).await.unwrap().unwrap();
  assert_eq!(batch.error_message.as_deref(), Some("source unreadable"));
}

#[tokio::test]
async fn skipping_running_is_an_invalid_transition() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  let err = s
    .transition_batch("BATCH_1".into(), BatchStatus::Success, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::InvalidTransition { .. })
  ));
}

#[tokio::test]
async fn reopening_a_batch_id_starts_a_fresh_attempt() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  s.transition_batch(
    "BATCH_1".into(),
    BatchStatus::Failed,
    None,
    Some("source unreadable".into()),
  )
  .await
  .unwrap();

  // Beginning the same id again wipes the failed attempt's record.
  open_batch(&s, "BATCH_1").await;

  let reopened = s.get_batch("BATCH_1".into()).await.unwrap().unwrap();
  assert_eq!(reopened.status, BatchStatus::Started);
  assert!(reopened.ended_at.is_none());
  assert!(reopened.error_message.is_none());

  // The new attempt walks the lifecycle from the top.
  s.transition_batch("BATCH_1".into(), BatchStatus::Running, None, None)
    .await
    .unwrap();
}

#[tokio::test]
async fn transition_unknown_batch_errors() {
  let s = store().await;
  let err = s
    .transition_batch("NOPE".into(), BatchStatus::Running, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::BatchNotFound(_))
  ));
}

#[tokio::test]
async fn list_batches_newest_first() {
  let s = store().await;
  let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
  s.begin_batch(IngestionBatch::open("BATCH_A", "a.json", early))
    .await
    .unwrap();
  s.begin_batch(IngestionBatch::open("BATCH_B", "b.json", late))
    .await
    .unwrap();

  let batches = s.list_batches(10).await.unwrap();
  assert_eq!(batches.len(), 2);
  assert_eq!(batches[0].batch_id, "BATCH_B");
}

// ─── Raw tier ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_raw_deduplicates_by_fingerprint() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  let now = Utc::now();
  let records = vec![
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", now),
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", now),
    RawRecord::stamp(sample_row("536365", "71053", "6"), "retail.json", "BATCH_1", now),
  ];

  let outcome = s.append_raw(records).await.unwrap();
  assert_eq!(outcome.inserted, 2);
  assert_eq!(outcome.duplicates, 1);
  assert_eq!(s.raw_count().await.unwrap(), 2);

  // Re-ingesting the same content is a no-op.
  open_batch(&s, "BATCH_2").await;
  let again =
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_2", now);
  let outcome = s.append_raw(vec![again]).await.unwrap();
  assert_eq!(outcome.inserted, 0);
  assert_eq!(outcome.duplicates, 1);
}

#[tokio::test]
async fn raw_records_roundtrip() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  let record =
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", Utc::now());
  let expected_hash = record.content_hash.clone();
  s.append_raw(vec![record]).await.unwrap();

  let fetched = s.raw_for_batch("BATCH_1".into()).await.unwrap();
  assert_eq!(fetched.len(), 1);
  assert_eq!(fetched[0].content_hash, expected_hash);
  assert_eq!(fetched[0].row.invoice.as_deref(), Some("536365"));
  assert_eq!(fetched[0].row.country.as_deref(), Some("United Kingdom"));
}

// ─── Cleaned tier ────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_cleaned_recomputes_the_batch_view() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;

  let record =
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", Utc::now());
  s.append_raw(vec![record.clone()]).await.unwrap();

  let CleanOutcome::Kept(txn) = clean(&record, &CleaningConfig::default()) else {
    panic!("sample row should survive cleaning");
  };

  s.replace_cleaned("BATCH_1".into(), vec![txn.clone()]).await.unwrap();
  s.replace_cleaned("BATCH_1".into(), vec![txn.clone()]).await.unwrap();

  let fetched = s.cleaned_for_batch("BATCH_1".into()).await.unwrap();
  assert_eq!(fetched.len(), 1);
  assert_eq!(fetched[0].raw_id, txn.raw_id);
  assert_eq!(fetched[0].line_total, Some(15.30));
  assert_eq!(fetched[0].invoiced_at, txn.invoiced_at);
  assert!(fetched[0].flags.is_valid_transaction);

  // A recomputation that keeps nothing empties the batch's view.
  s.replace_cleaned("BATCH_1".into(), vec![]).await.unwrap();
  let emptied = s.cleaned_for_batch("BATCH_1".into()).await.unwrap();
  assert!(emptied.is_empty());
}

#[tokio::test]
async fn cleaned_since_honours_the_watermark() {
  let s = store().await;
  open_batch(&s, "BATCH_1").await;
  open_batch(&s, "BATCH_2").await;

  let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

  let first =
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", early);
  let second =
    RawRecord::stamp(sample_row("536366", "71053", "4"), "retail.json", "BATCH_2", late);
  s.append_raw(vec![first.clone(), second.clone()]).await.unwrap();

  for record in [&first, &second] {
    let CleanOutcome::Kept(txn) = clean(record, &CleaningConfig::default()) else {
      panic!("sample row should survive cleaning");
    };
    s.replace_cleaned(txn.batch_id.clone(), vec![txn]).await.unwrap();
  }

  let all = s.cleaned_since(None).await.unwrap();
  assert_eq!(all.len(), 2);

  // At-or-after: a watermark equal to a row's load time includes it.
  let since = s.cleaned_since(Some(late)).await.unwrap();
  assert_eq!(since.len(), 1);
  assert_eq!(since[0].invoice, "536366");
}

// ─── Product dimension ───────────────────────────────────────────────────────

#[tokio::test]
async fn product_versioning_closes_prior_and_keeps_history() {
  let s = store().await;

  let v1 = s
    .insert_product_version("85123A".into(), product_attrs(500.0), day(2010, 12, 1))
    .await
    .unwrap();
  assert_eq!(v1.version_number, 1);
  assert!(v1.is_current);

  let v2 = s
    .revise_product(v1.clone(), product_attrs(12_000.0), day(2011, 3, 1))
    .await
    .unwrap();
  assert_eq!(v2.version_number, 2);
  assert_eq!(v2.attributes.performance_tier, PerformanceTier::High);

  let current = s.current_product("85123A".into()).await.unwrap().unwrap();
  assert_eq!(current.surrogate_key, v2.surrogate_key);

  let history = s.product_versions("85123A".into()).await.unwrap();
  assert_eq!(history.len(), 2);
  assert!(!history[0].is_current);
  assert_eq!(history[0].expiration_date, Some(day(2011, 3, 1)));
  assert!(history[1].is_current);
  assert_eq!(history[1].expiration_date, None);
}

#[tokio::test]
async fn revising_a_stale_product_version_errors() {
  let s = store().await;

  let v1 = s
    .insert_product_version("85123A".into(), product_attrs(500.0), day(2010, 12, 1))
    .await
    .unwrap();
  s.revise_product(v1.clone(), product_attrs(2_000.0), day(2011, 1, 1))
    .await
    .unwrap();

  // v1 is closed now; a second revision from the same snapshot must fail
  // and leave exactly one current version behind.
  let err = s
    .revise_product(v1, product_attrs(3_000.0), day(2011, 2, 1))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::StaleRevision(_))
  ));

  let currents = s.current_products().await.unwrap();
  assert_eq!(currents.len(), 1);
  assert_eq!(currents[0].version_number, 2);
}

// ─── Customer dimension ──────────────────────────────────────────────────────

#[tokio::test]
async fn customer_versioning_roundtrip() {
  let s = store().await;

  let v1 = s
    .insert_customer_version("17850".into(), customer_attrs(1, 15.30), day(2010, 12, 1))
    .await
    .unwrap();
  assert_eq!(v1.attributes.segment, CustomerSegment::OneTime);

  let v2 = s
    .revise_customer(v1, customer_attrs(3, 120.0), day(2011, 1, 15))
    .await
    .unwrap();
  assert_eq!(v2.attributes.segment, CustomerSegment::Repeat);

  let current = s.current_customer("17850".into()).await.unwrap().unwrap();
  assert_eq!(current.version_number, 2);
  assert_eq!(current.attributes.country.as_deref(), Some("United Kingdom"));
  assert_eq!(current.attributes.first_purchase, Some(day(2010, 12, 1)));

  let history = s.customer_versions("17850".into()).await.unwrap();
  assert_eq!(history.len(), 2);
}

// ─── Calendar ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_calendar_is_idempotent() {
  let s = store().await;
  let rows = build_calendar(day(2010, 12, 1), day(2010, 12, 31));

  let inserted = s.ensure_calendar(rows.clone()).await.unwrap();
  assert_eq!(inserted, 31);
  let inserted = s.ensure_calendar(rows).await.unwrap();
  assert_eq!(inserted, 0);

  let bounds = s.calendar_bounds().await.unwrap();
  assert_eq!(bounds, Some((20101201, 20101231)));
}

#[tokio::test]
async fn empty_calendar_has_no_bounds() {
  let s = store().await;
  assert_eq!(s.calendar_bounds().await.unwrap(), None);
}

// ─── Fact tier ───────────────────────────────────────────────────────────────

/// Seed the dimensions a fact row joins against, returning its builder.
async fn seeded_fact(s: &SqliteWarehouse) -> FactRow {
  open_batch(s, "BATCH_1").await;
  s.ensure_calendar(build_calendar(day(2010, 12, 1), day(2010, 12, 31)))
    .await
    .unwrap();
  let product = s
    .insert_product_version("85123A".into(), product_attrs(500.0), day(2010, 12, 1))
    .await
    .unwrap();
  let customer = s
    .insert_customer_version("17850".into(), customer_attrs(1, 15.30), day(2010, 12, 1))
    .await
    .unwrap();

  let record =
    RawRecord::stamp(sample_row("536365", "85123A", "6"), "retail.json", "BATCH_1", Utc::now());
  s.append_raw(vec![record.clone()]).await.unwrap();
  let CleanOutcome::Kept(txn) = clean(&record, &CleaningConfig::default()) else {
    panic!("sample row should survive cleaning");
  };

  FactRow::assemble(
    &txn,
    product.surrogate_key,
    Some(customer.surrogate_key),
    6,
    2.55,
    15.30,
  )
}

#[tokio::test]
async fn upsert_facts_is_idempotent_by_fact_id() {
  let s = store().await;
  let fact = seeded_fact(&s).await;

  let outcome = s.upsert_facts(vec![fact.clone()]).await.unwrap();
  assert_eq!(outcome.inserted, 1);
  assert_eq!(outcome.updated, 0);

  let outcome = s.upsert_facts(vec![fact.clone()]).await.unwrap();
  assert_eq!(outcome.inserted, 0);
  assert_eq!(outcome.updated, 1);
  assert_eq!(s.fact_count().await.unwrap(), 1);

  let fetched = s.fact_by_id(fact.fact_id.clone()).await.unwrap().unwrap();
  assert_eq!(fetched, fact);
}

#[tokio::test]
async fn merge_watermark_roundtrip() {
  let s = store().await;
  assert!(s.merge_watermark().await.unwrap().is_none());

  let mark = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
  s.set_merge_watermark(mark).await.unwrap();
  assert_eq!(s.merge_watermark().await.unwrap(), Some(mark));

  let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
  s.set_merge_watermark(later).await.unwrap();
  assert_eq!(s.merge_watermark().await.unwrap(), Some(later));
}

// ─── Quality and audit ───────────────────────────────────────────────────────

#[tokio::test]
async fn record_quality_persists_reports() {
  let s = store().await;
  let report = strata_core::quality::score_raw(
    "BATCH_1",
    &[],
    0,
    &strata_core::quality::QualityWeights::default(),
  );
  s.record_quality(report).await.unwrap();
}

#[tokio::test]
async fn warehouse_audit_is_clean_for_consistent_data() {
  let s = store().await;
  let fact = seeded_fact(&s).await;
  s.upsert_facts(vec![fact]).await.unwrap();

  let audit = s.warehouse_audit(0.01).await.unwrap();
  assert_eq!(audit.fact_count, 1);
  assert_eq!(audit.orphan_product_facts, 0);
  assert_eq!(audit.orphan_date_facts, 0);
  assert_eq!(audit.orphan_customer_facts, 0);
  assert_eq!(audit.measure_mismatch_facts, 0);
  assert!(audit.duplicate_current_products.is_empty());
  assert!(audit.duplicate_current_customers.is_empty());
}

#[tokio::test]
async fn warehouse_audit_flags_measure_mismatch() {
  let s = store().await;
  let mut fact = seeded_fact(&s).await;
  fact.line_total = 99.99; // disagrees with 6 x 2.55
  s.upsert_facts(vec![fact]).await.unwrap();

  let audit = s.warehouse_audit(0.01).await.unwrap();
  assert_eq!(audit.measure_mismatch_facts, 1);
}
