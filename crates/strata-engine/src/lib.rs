//! The Strata pipeline engine.
//!
//! Orchestrates the five warehouse stages (raw ingestion, cleaning,
//! dimension maintenance, fact merging, and quality monitoring) over any
//! [`strata_core::store::WarehouseStore`] backend. Each stage is exposed as
//! its own method on [`Engine`] so operators can run them independently;
//! [`Engine::run_pipeline`] chains them in dependency order.

pub mod cleanse;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod facts;
pub mod ingest;
pub mod lock;
pub mod pipeline;
pub mod quality;

use std::sync::Arc;

use strata_core::store::WarehouseStore;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

use crate::lock::TableLocks;

/// Pipeline orchestrator over one warehouse store.
///
/// Cloning is cheap; clones share the store handle and the per-table
/// maintenance locks, so two clones cannot run conflicting writers.
#[derive(Clone)]
pub struct Engine<S> {
  store:  Arc<S>,
  config: EngineConfig,
  locks:  Arc<TableLocks>,
}

impl<S: WarehouseStore> Engine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    let locks = Arc::new(TableLocks::new(config.lock_timeout()));
    Self { store, config, locks }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }
}
