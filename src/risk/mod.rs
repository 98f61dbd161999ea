//! stETH/ETH basis risk metrics
//!
//! Pure, order-dependent transformations over a [`PriceSeries`]:
//!
//! ```text
//! prices → basis → fixed-lag change → rolling quantile (historical VaR)
//! ```
//!
//! Undefined points are carried as `None` and propagate: a lagged
//! difference with an undefined operand is undefined, and a rolling window
//! containing any undefined value yields no quantile (`min_periods = window`).
//!
//! Quantiles use linear interpolation between order statistics, the same
//! convention as numpy/pandas `"linear"`.


use crate::config::RiskConfig;
use crate::types::{PriceSeries, RiskRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Rolling window must be at least 1, got {0}")]
    InvalidWindow(usize),

    #[error("Quantile must be in (0, 1), got {0}")]
    InvalidQuantile(f64),
}

/// How the basis is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BasisMode {
    /// steth / eth
    Ratio,
    /// steth / eth - 1, e.g. +0.01 => stETH trades 1% above ETH
    #[default]
    DeviationFromPar,
}

/// Basis per observation
///
/// A non-positive or non-finite ETH price, or a non-finite stETH price,
/// leaves that point undefined.
pub fn compute_basis(series: &PriceSeries, mode: BasisMode) -> Vec<Option<f64>> {
    let basis: Vec<Option<f64>> = series
        .points()
        .iter()
        .map(|p| {
            let (steth, eth) = (p.steth_price_usd, p.eth_price_usd);
            if !steth.is_finite() || !eth.is_finite() || eth <= 0.0 {
                return None;
            }
            let ratio = steth / eth;
            match mode {
                BasisMode::Ratio => Some(ratio),
                BasisMode::DeviationFromPar => Some(ratio - 1.0),
            }
        })
        .collect();

    let undefined = basis.iter().filter(|b| b.is_none()).count();
    if undefined > 0 {
        warn!(
            "{} of {} price rows have an unusable price; basis left undefined there",
            undefined,
            basis.len()
        );
    }
    basis
}

/// `values[t] - values[t - lag]`; the first `lag` outputs are undefined
pub fn lag_diff(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(t, current)| {
            if t < lag {
                return None;
            }
            match (current, values[t - lag]) {
                (Some(now), Some(then)) => Some(now - then),
                _ => None,
            }
        })
        .collect()
}

/// q-quantile of an unsorted sample, linear interpolation between order statistics
pub fn quantile(sample: &[f64], q: f64) -> Result<Option<f64>, RiskError> {
    check_quantile(q)?;
    if sample.is_empty() {
        return Ok(None);
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(Some(interpolate(&sorted, q)))
}

fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let frac = h - lo as f64;
    if frac == 0.0 || lo + 1 >= sorted.len() {
        return sorted[lo];
    }
    sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
}

fn check_quantile(q: f64) -> Result<(), RiskError> {
    if q > 0.0 && q < 1.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidQuantile(q))
    }
}

/// Trailing-window quantile, defined only once `window` defined values fill the window
pub fn rolling_quantile(
    values: &[Option<f64>],
    window: usize,
    q: f64,
) -> Result<Vec<Option<f64>>, RiskError> {
    if window == 0 {
        return Err(RiskError::InvalidWindow(window));
    }
    check_quantile(q)?;

    let mut out = Vec::with_capacity(values.len());
    let mut scratch = Vec::with_capacity(window);
    for t in 0..values.len() {
        if t + 1 < window {
            out.push(None);
            continue;
        }
        scratch.clear();
        scratch.extend(values[t + 1 - window..=t].iter().flatten().copied());
        if scratch.len() < window {
            out.push(None);
            continue;
        }
        scratch.sort_by(f64::total_cmp);
        out.push(Some(interpolate(&scratch, q)));
    }
    Ok(out)
}

/// Parameters of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskParams {
    pub basis_mode: BasisMode,
    /// Change horizon in rows
    pub change_lag: usize,
    /// VaR lookback in rows
    pub window: usize,
    /// Left-tail quantile
    pub quantile: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            basis_mode: BasisMode::DeviationFromPar,
            change_lag: 14,
            window: 720,
            quantile: 0.01,
        }
    }
}

impl From<&RiskConfig> for RiskParams {
    fn from(config: &RiskConfig) -> Self {
        Self {
            basis_mode: BasisMode::DeviationFromPar,
            change_lag: config.change_lag,
            window: config.window,
            quantile: config.quantile,
        }
    }
}

impl RiskParams {
    /// Column label in the `var_720d_1p` style
    pub fn var_label(&self) -> String {
        // integer percent, truncated: q = 0.025 is labelled 2p
        let q_pct = (self.quantile * 100.0).trunc() as i64;
        format!("var_{}d_{}p", self.window, q_pct)
    }

    /// Confidence level in percent, 0.01 => 99
    pub fn confidence_pct(&self) -> f64 {
        ((1.0 - self.quantile) * 100.0 * 100.0).round() / 100.0
    }
}

/// Derived risk series aligned with the input prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskFrame {
    pub params: RiskParams,
    pub rows: Vec<RiskRow>,
}

/// Latest values, in percent, for the printed report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSummary {
    pub date: DateTime<Utc>,
    pub basis_pct: Option<f64>,
    /// Magnitude of the left-tail quantile
    pub var_pct: Option<f64>,
}

impl RiskFrame {
    pub fn latest(&self) -> Option<&RiskRow> {
        self.rows.last()
    }

    pub fn summary(&self) -> Option<RiskSummary> {
        self.latest().map(|row| RiskSummary {
            date: row.date,
            basis_pct: row.basis.map(|b| b * 100.0),
            var_pct: row.var.map(|v| -v * 100.0),
        })
    }

    /// Number of rows with a defined VaR
    pub fn var_count(&self) -> usize {
        self.rows.iter().filter(|r| r.var.is_some()).count()
    }
}

/// Runs basis → change → rolling VaR over a price series
#[derive(Debug, Clone)]
pub struct RiskPipeline {
    params: RiskParams,
}

impl RiskPipeline {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn run(&self, series: &PriceSeries) -> Result<RiskFrame, RiskError> {
        let p = &self.params;
        let basis = compute_basis(series, p.basis_mode);
        let change = lag_diff(&basis, p.change_lag);
        let var = rolling_quantile(&change, p.window, p.quantile)?;

        let rows: Vec<RiskRow> = series
            .points()
            .iter()
            .enumerate()
            .map(|(i, point)| RiskRow {
                date: point.date,
                steth_price_usd: point.steth_price_usd,
                eth_price_usd: point.eth_price_usd,
                basis: basis[i],
                change: change[i],
                var: var[i],
            })
            .collect();

        let frame = RiskFrame { params: *p, rows };
        debug!(
            "Risk frame: {} rows, {} with {}",
            frame.rows.len(),
            frame.var_count(),
            p.var_label()
        );
        Ok(frame)
    }
}
