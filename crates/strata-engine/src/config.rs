//! Engine configuration.
//!
//! Deserialised from a TOML file plus `STRATA_`-prefixed environment
//! variables by the binary; every field has a default so a missing config
//! file still yields a working engine.

use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use serde::Deserialize;
use strata_core::{clean::CleaningConfig, quality::QualityWeights};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// SQLite database path.
  pub store_path: PathBuf,

  /// Cleaning-stage bounds.
  pub cleaning: CleaningConfig,

  /// Inclusive range the calendar dimension is generated over. Must cover
  /// every invoice date the source can produce; out-of-range dates are
  /// rejected at merge time rather than silently keyed.
  pub calendar_start: NaiveDate,
  pub calendar_end:   NaiveDate,

  /// Permitted drift between `line_total` and `quantity x unit_price`.
  pub measure_tolerance: f64,

  /// Relative weights for the overall quality score.
  pub quality: QualityWeights,

  /// How long a stage waits for a per-table maintenance lock before giving
  /// up with a busy error.
  pub lock_timeout_secs: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("strata.db"),
      cleaning: CleaningConfig::default(),
      // Covers the full historical range of the retail dataset with slack
      // on both ends.
      calendar_start: NaiveDate::from_ymd_opt(2009, 1, 1).unwrap(),
      calendar_end: NaiveDate::from_ymd_opt(2012, 12, 31).unwrap(),
      measure_tolerance: 0.01,
      quality: QualityWeights::default(),
      lock_timeout_secs: 30,
    }
  }
}

impl EngineConfig {
  pub fn lock_timeout(&self) -> Duration {
    Duration::from_secs(self.lock_timeout_secs)
  }
}
