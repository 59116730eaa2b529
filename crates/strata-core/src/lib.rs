//! Core types and trait definitions for the Strata warehouse engine.
//!
//! This crate is deliberately free of database and I/O dependencies. It holds
//! the domain model for all three warehouse tiers (raw landing, cleaned,
//! dimensional), the pure transformation functions between them, and the
//! [`store::WarehouseStore`] trait that storage backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod calendar;
pub mod clean;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod quality;
pub mod raw;
pub mod store;

pub use error::{Error, Result};
