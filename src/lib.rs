//! oddsledger — esports match odds and prediction ledger.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod clock;
pub mod config;
pub mod types;
pub mod fetcher;
pub mod storage;
pub mod engine;
