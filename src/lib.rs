//! stETH/ETH peg risk and Curve pool tooling
//!
//! Two independent flows sharing only configuration:
//!
//! ```text
//! Risk:  Dune prices → basis → 14d change → rolling VaR → HTML chart
//! Pool:  anvil fork → Curve USDC/crvUSD reads → impersonated USDC withdrawal
//! ```

pub mod chart;
pub mod client;
pub mod config;
pub mod curve;
pub mod error;
pub mod report;
pub mod risk;
pub mod rpc;
pub mod types;
pub mod utils;
