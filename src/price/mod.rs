//! Price sources.
//!
//! Defines the `PriceSource` trait and the RedStone-on-Arweave
//! implementation used in production.

pub mod redstone;

use async_trait::async_trait;

use crate::types::{OracleError, PriceRecord};

/// Abstraction over anything that can produce the current reference price.
///
/// Implementations fail closed: a missing or malformed value is an error,
/// never a default.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch and validate the latest price.
    async fn fetch_price(&self) -> Result<PriceRecord, OracleError>;
}
