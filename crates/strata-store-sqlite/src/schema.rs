//! SQL schema for the Strata SQLite warehouse.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ingestion_batches (
    batch_id          TEXT PRIMARY KEY,
    source_file       TEXT NOT NULL,
    status            TEXT NOT NULL,   -- STARTED | RUNNING | SUCCESS | FAILED
    started_at        TEXT NOT NULL,   -- ISO 8601 UTC
    ended_at          TEXT,
    records_processed INTEGER NOT NULL DEFAULT 0,
    records_inserted  INTEGER NOT NULL DEFAULT 0,
    records_failed    INTEGER NOT NULL DEFAULT 0,
    error_message     TEXT
);

-- Raw landings are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS raw_records (
    record_id      TEXT PRIMARY KEY,
    invoice_no     TEXT,
    stock_code     TEXT,
    description    TEXT,
    quantity       TEXT,            -- natural fields stay text until cleaning
    invoice_date   TEXT,
    unit_price     TEXT,
    customer_id    TEXT,
    country        TEXT,
    source_file    TEXT NOT NULL,
    batch_id       TEXT NOT NULL REFERENCES ingestion_batches(batch_id),
    load_timestamp TEXT NOT NULL,
    content_hash   TEXT NOT NULL UNIQUE   -- SHA-256 fingerprint, dedup anchor
);

-- The cleaned view: one row per surviving raw record, recomputed in place.
CREATE TABLE IF NOT EXISTS cleaned_transactions (
    raw_id                TEXT PRIMARY KEY REFERENCES raw_records(record_id),
    content_hash          TEXT NOT NULL,
    batch_id              TEXT NOT NULL,
    load_timestamp        TEXT NOT NULL,
    invoice               TEXT NOT NULL,
    stock_code            TEXT NOT NULL,
    description           TEXT,
    quantity              INTEGER,
    unit_price            REAL,
    invoiced_at           TEXT NOT NULL,
    customer_id           TEXT,
    country               TEXT,
    line_total            REAL,
    date_key              INTEGER NOT NULL,
    is_return             INTEGER NOT NULL,
    is_cancelled          INTEGER NOT NULL,
    is_complete           INTEGER NOT NULL,
    has_customer_id       INTEGER NOT NULL,
    has_valid_description INTEGER NOT NULL,
    is_valid_transaction  INTEGER NOT NULL
);

-- Type-2 product dimension. Closed versions keep their rows forever; the
-- partial unique index enforces at most one current version per key.
CREATE TABLE IF NOT EXISTS dim_product (
    product_key      INTEGER PRIMARY KEY,
    stock_code       TEXT NOT NULL,
    description      TEXT NOT NULL,
    category         TEXT NOT NULL,
    performance_tier TEXT NOT NULL,
    total_quantity   INTEGER NOT NULL,
    total_revenue    REAL NOT NULL,
    effective_date   TEXT NOT NULL,
    expiration_date  TEXT,
    is_current       INTEGER NOT NULL,
    version_number   INTEGER NOT NULL,
    UNIQUE (stock_code, version_number)
);

CREATE UNIQUE INDEX IF NOT EXISTS dim_product_current_idx
    ON dim_product(stock_code) WHERE is_current = 1;

CREATE TABLE IF NOT EXISTS dim_customer (
    customer_key    INTEGER PRIMARY KEY,
    customer_id     TEXT NOT NULL,
    country         TEXT,
    segment         TEXT NOT NULL,
    total_orders    INTEGER NOT NULL,
    lifetime_value  REAL NOT NULL,
    first_purchase  TEXT,
    last_purchase   TEXT,
    effective_date  TEXT NOT NULL,
    expiration_date TEXT,
    is_current      INTEGER NOT NULL,
    version_number  INTEGER NOT NULL,
    UNIQUE (customer_id, version_number)
);

CREATE UNIQUE INDEX IF NOT EXISTS dim_customer_current_idx
    ON dim_customer(customer_id) WHERE is_current = 1;

-- Static precomputed calendar; never versioned.
CREATE TABLE IF NOT EXISTS dim_date (
    date_key        INTEGER PRIMARY KEY,   -- yyyymmdd
    full_date       TEXT NOT NULL,
    day_of_week     INTEGER NOT NULL,      -- 1 = Sunday .. 7 = Saturday
    day_name        TEXT NOT NULL,
    day_of_month    INTEGER NOT NULL,
    day_of_year     INTEGER NOT NULL,
    week_of_year    INTEGER NOT NULL,
    month_number    INTEGER NOT NULL,
    month_name      TEXT NOT NULL,
    quarter         INTEGER NOT NULL,
    quarter_name    TEXT NOT NULL,
    year            INTEGER NOT NULL,
    is_weekend      INTEGER NOT NULL,
    is_holiday      INTEGER NOT NULL,
    fiscal_year     INTEGER NOT NULL,
    fiscal_quarter  INTEGER NOT NULL,
    is_business_day INTEGER NOT NULL
);

-- Fact grain: one source transaction line, keyed by its content hash so
-- re-merges upsert instead of duplicating. Rows are never deleted.
CREATE TABLE IF NOT EXISTS fact_sales (
    fact_id        TEXT PRIMARY KEY,
    date_key       INTEGER NOT NULL REFERENCES dim_date(date_key),
    product_key    INTEGER NOT NULL REFERENCES dim_product(product_key),
    customer_key   INTEGER REFERENCES dim_customer(customer_key),
    invoice        TEXT NOT NULL,
    stock_code     TEXT NOT NULL,
    quantity       INTEGER NOT NULL,
    unit_price     REAL NOT NULL,
    line_total     REAL NOT NULL,
    discount       REAL NOT NULL DEFAULT 0,
    net_amount     REAL NOT NULL,
    is_return      INTEGER NOT NULL,
    is_cancelled   INTEGER NOT NULL,
    source_raw_id  TEXT NOT NULL,
    batch_id       TEXT NOT NULL,
    load_timestamp TEXT NOT NULL
);

-- Append-only quality history: one row per check per report.
CREATE TABLE IF NOT EXISTS quality_metrics (
    metric_id      INTEGER PRIMARY KEY,
    batch_id       TEXT NOT NULL,
    layer          TEXT NOT NULL,   -- raw | cleaned | dimensional
    check_name     TEXT NOT NULL,
    table_name     TEXT NOT NULL,
    failed_records INTEGER NOT NULL,
    total_records  INTEGER NOT NULL,
    failure_pct    REAL NOT NULL,
    status         TEXT NOT NULL,   -- PASS | FAIL
    completeness   REAL NOT NULL,
    validity       REAL NOT NULL,
    consistency    REAL NOT NULL,
    overall        REAL NOT NULL,
    measured_at    TEXT NOT NULL
);

-- Small key/value side table for merge bookkeeping.
CREATE TABLE IF NOT EXISTS warehouse_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS raw_batch_idx       ON raw_records(batch_id);
CREATE INDEX IF NOT EXISTS cleaned_batch_idx   ON cleaned_transactions(batch_id);
CREATE INDEX IF NOT EXISTS cleaned_loaded_idx  ON cleaned_transactions(load_timestamp);
CREATE INDEX IF NOT EXISTS fact_date_idx       ON fact_sales(date_key);
CREATE INDEX IF NOT EXISTS fact_product_idx    ON fact_sales(product_key);
CREATE INDEX IF NOT EXISTS quality_batch_idx   ON quality_metrics(batch_id);

PRAGMA user_version = 1;
";
