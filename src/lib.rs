//! Yield allocator: risk-adjusted USDC allocation across Moonwell and Morpho
//! with streamed deposit execution.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod protocols;
pub mod strategy;
pub mod engine;
pub mod wallet;
pub mod wire;
pub mod server;
