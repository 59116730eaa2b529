//! Error types for `strata-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("batch not found: {0}")]
  BatchNotFound(String),

  #[error("batch {0} is already in terminal state {1}")]
  BatchTerminal(String, String),

  #[error("invalid batch transition: {from} -> {to}")]
  InvalidTransition { from: String, to: String },

  #[error("dimension version {0} is no longer current")]
  StaleRevision(i64),

  #[error("unknown batch status: {0:?}")]
  UnknownBatchStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
