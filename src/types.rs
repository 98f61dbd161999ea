//! Core data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One daily observation of stETH and ETH prices in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub steth_price_usd: f64,
    pub eth_price_usd: f64,
}

/// Price observations ordered by date ascending
///
/// The only constructor sorts its input, so lagged and rolling
/// computations downstream always see the rows in time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// One row of the derived risk frame; `None` marks an undefined value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskRow {
    pub date: DateTime<Utc>,
    pub steth_price_usd: f64,
    pub eth_price_usd: f64,
    pub basis: Option<f64>,
    pub change: Option<f64>,
    pub var: Option<f64>,
}
