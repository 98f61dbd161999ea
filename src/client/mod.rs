//! External data clients
//!
//! - Dune: saved-query results with daily stETH/ETH prices

pub mod dune;

#[cfg(test)]
mod tests;

pub use dune::DuneClient;

use crate::error::Result;
use crate::types::PriceSeries;
use async_trait::async_trait;

/// Source of daily stETH/ETH prices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the full price history, sorted by date
    async fn fetch_prices(&self) -> Result<PriceSeries>;

    /// Source name for logging
    fn name(&self) -> &str;
}
