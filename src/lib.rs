//! AO price oracle: reads the latest RedStone AO price from Arweave and
//! pushes it to an AO process on a fixed cadence.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod credential;
pub mod engine;
pub mod health;
pub mod price;
pub mod submit;
pub mod types;
