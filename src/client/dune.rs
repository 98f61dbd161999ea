//! Dune API client for stETH/ETH daily prices
//!
//! Reads the latest results of a saved query. The query must return the
//! columns `date`, `steth_price_usd` and `eth_price_usd`.

use crate::client::PriceSource;
use crate::config::DuneConfig;
use crate::error::{PegError, Result};
use crate::types::{PricePoint, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

pub const REQUIRED_COLUMNS: [&str; 3] = ["date", "steth_price_usd", "eth_price_usd"];

const API_KEY_HEADER: &str = "X-Dune-API-Key";

/// Dune query-results client
#[derive(Clone)]
pub struct DuneClient {
    http: Client,
    base_url: String,
    api_key: String,
    query_id: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResultsResponse {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    rows: Vec<Map<String, Value>>,
}

impl DuneClient {
    /// Create a new Dune client
    pub fn new(config: &DuneConfig, api_key: String, query_id: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            query_id,
        })
    }

    pub fn results_url(&self) -> String {
        format!("{}/query/{}/results", self.base_url, self.query_id)
    }

    /// Fetch and parse the saved query results
    pub async fn fetch_query_results(&self) -> Result<PriceSeries> {
        let url = self.results_url();
        info!("Fetching Dune query {} results", self.query_id);

        let body = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let series = parse_query_results(&body)?;
        debug!(
            "Dune returned {} rows ({:?} .. {:?})",
            series.len(),
            series.first().map(|p| p.date),
            series.last().map(|p| p.date)
        );
        Ok(series)
    }
}

#[async_trait]
impl PriceSource for DuneClient {
    async fn fetch_prices(&self) -> Result<PriceSeries> {
        self.fetch_query_results().await
    }

    fn name(&self) -> &str {
        "dune"
    }
}

/// Parse a query-results payload into a date-sorted price series
pub fn parse_query_results(body: &str) -> Result<PriceSeries> {
    let resp: QueryResultsResponse = serde_json::from_str(body)?;
    let rows = resp.result.rows;

    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.contains(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PegError::MissingColumns(missing));
    }

    let points = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(i, row))
        .collect::<Result<Vec<_>>>()?;

    Ok(PriceSeries::new(points))
}

fn parse_row(index: usize, row: &Map<String, Value>) -> Result<PricePoint> {
    let date = match row.get("date") {
        Some(Value::String(s)) => parse_date(s).ok_or_else(|| {
            PegError::InvalidData(format!("row {}: unrecognised date {:?}", index, s))
        })?,
        other => {
            return Err(PegError::InvalidData(format!(
                "row {}: date must be a string, got {:?}",
                index, other
            )))
        }
    };

    Ok(PricePoint {
        date,
        steth_price_usd: parse_price(index, "steth_price_usd", row.get("steth_price_usd"))?,
        eth_price_usd: parse_price(index, "eth_price_usd", row.get("eth_price_usd"))?,
    })
}

/// Numbers and numeric strings are accepted; null or absent becomes NaN
fn parse_price(index: usize, column: &str, value: Option<&Value>) -> Result<f64> {
    match value {
        None | Some(Value::Null) => Ok(f64::NAN),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            PegError::InvalidData(format!("row {}: {} out of range", index, column))
        }),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            PegError::InvalidData(format!("row {}: {} is not numeric: {:?}", index, column, s))
        }),
        Some(other) => Err(PegError::InvalidData(format!(
            "row {}: {} has unexpected type: {}",
            index, column, other
        ))),
    }
}

/// Dates as Dune renders them, all interpreted as UTC
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = s.strip_suffix(" UTC").unwrap_or(s);
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
