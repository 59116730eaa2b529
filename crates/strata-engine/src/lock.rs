//! Per-table maintenance locks.
//!
//! Dimension maintenance and fact merging are single-flight per table:
//! concurrent writers for the *same* table serialise (or give up after a
//! timeout), writers for different tables proceed in parallel. Readers are
//! never blocked; they simply see the pre-update state.

use std::{collections::HashMap, sync::Arc, sync::Mutex, time::Duration};

use tokio::sync::OwnedMutexGuard;

use crate::error::{EngineError, Result};

pub struct TableLocks {
  tables:  Mutex<HashMap<&'static str, Arc<tokio::sync::Mutex<()>>>>,
  timeout: Duration,
}

impl TableLocks {
  pub fn new(timeout: Duration) -> Self {
    Self { tables: Mutex::new(HashMap::new()), timeout }
  }

  /// Acquire the lock for `table`, waiting up to the configured timeout.
  /// The lock is held until the returned guard is dropped.
  pub async fn acquire(&self, table: &'static str) -> Result<OwnedMutexGuard<()>> {
    let lock = {
      let mut tables = self.tables.lock().expect("table lock map poisoned");
      Arc::clone(tables.entry(table).or_default())
    };

    tokio::time::timeout(self.timeout, lock.lock_owned())
      .await
      .map_err(|_| EngineError::MaintenanceBusy { table })
  }
}
