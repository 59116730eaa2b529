//! Error type for `strata-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Another writer holds the maintenance lock for this table.
  #[error("maintenance already running for {table}")]
  MaintenanceBusy { table: &'static str },

  #[error("batch not found: {0}")]
  BatchNotFound(String),

  /// The fact merger requires a populated calendar dimension.
  #[error("calendar dimension is empty")]
  EmptyCalendar,
}

impl EngineError {
  /// Wrap a backend error. The engine is generic over the store, so backend
  /// errors cross this boundary type-erased.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
