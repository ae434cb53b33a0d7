//! Core types and trait definitions for the raport promotion/history store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod ledger;
pub mod promotion;
pub mod registry;
pub mod store;

pub use error::{Error, ErrorCategory, Result};
