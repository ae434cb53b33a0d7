//! SQLite backend for the raport promotion/history store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Multi-statement operations (promotion
//! runs, enrollment, backfill) run inside a single SQLite transaction.

mod backfill;
mod encode;
mod ledger;
mod lock;
mod promotion;
mod registry;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
