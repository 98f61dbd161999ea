//! End-to-end basis VaR run: fetch → compute → chart

use crate::chart::write_basis_var_chart;
use crate::client::PriceSource;
use crate::error::{PegError, Result};
use crate::risk::{RiskFrame, RiskParams, RiskPipeline, RiskSummary};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct BasisVarReport {
    pub frame: RiskFrame,
    pub summary: RiskSummary,
    pub chart_path: PathBuf,
}

pub async fn run_basis_var(
    source: &dyn PriceSource,
    params: RiskParams,
    chart_path: &Path,
) -> Result<BasisVarReport> {
    let series = source.fetch_prices().await?;
    info!("{} returned {} price rows", source.name(), series.len());

    let frame = RiskPipeline::new(params).run(&series)?;
    let summary = frame
        .summary()
        .ok_or_else(|| PegError::InvalidData(format!("{} returned no price rows", source.name())))?;

    let chart_path = write_basis_var_chart(&frame, chart_path)?;
    Ok(BasisVarReport {
        frame,
        summary,
        chart_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockPriceSource;
    use crate::types::{PricePoint, PriceSeries};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn prices(n: usize) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        PriceSeries::new(
            (0..n)
                .map(|i| PricePoint {
                    date: start + Duration::days(i as i64),
                    steth_price_usd: 1800.0 * (1.0 - 0.0005 * (i % 9) as f64),
                    eth_price_usd: 1800.0,
                })
                .collect(),
        )
    }

    fn source_with(series: PriceSeries) -> MockPriceSource {
        let mut source = MockPriceSource::new();
        source.expect_name().return_const("mock".to_string());
        source
            .expect_fetch_prices()
            .times(1)
            .returning(move || Ok(series.clone()));
        source
    }

    #[tokio::test]
    async fn test_run_basis_var_writes_chart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("publish").join("var.html");
        let source = source_with(prices(60));
        let params = RiskParams {
            window: 30,
            ..Default::default()
        };

        let report = run_basis_var(&source, params, &path).await.unwrap();
        assert_eq!(report.frame.rows.len(), 60);
        assert_eq!(report.frame.var_count(), 60 - (14 + 30 - 1));
        assert!(report.summary.var_pct.unwrap() >= 0.0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_run_basis_var_empty_source_fails() {
        let dir = tempdir().unwrap();
        let source = source_with(PriceSeries::default());
        let err = run_basis_var(&source, RiskParams::default(), &dir.path().join("x.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, PegError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_run_basis_var_propagates_source_error() {
        let dir = tempdir().unwrap();
        let mut source = MockPriceSource::new();
        source.expect_name().return_const("mock".to_string());
        source
            .expect_fetch_prices()
            .returning(|| Err(PegError::MissingColumns(vec!["date".to_string()])));

        let err = run_basis_var(&source, RiskParams::default(), &dir.path().join("x.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, PegError::MissingColumns(_)));
    }
}
