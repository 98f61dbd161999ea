//! Interactive basis/VaR chart
//!
//! Renders a standalone HTML page driven by Plotly.js: VaR magnitude on the
//! left axis, basis on the right axis, both in percent. Undefined values are
//! written as `null` so Plotly leaves gaps.

use crate::error::Result;
use crate::risk::{BasisMode, RiskFrame, RiskParams};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Axis and trace labels derived from the pipeline parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLabels {
    pub title: String,
    pub var_trace: String,
    pub basis_trace: String,
}

impl ChartLabels {
    pub fn from_params(params: &RiskParams) -> Self {
        let conf = params.confidence_pct();
        let lag = params.change_lag;
        let window = params.window;
        let basis_trace = match params.basis_mode {
            BasisMode::DeviationFromPar => "stETH/ETH basis (%, stETH/ETH - 1)".to_string(),
            BasisMode::Ratio => "stETH/ETH ratio (%)".to_string(),
        };

        Self {
            title: format!(
                "stETH/ETH Basis and {}-Day {}% Historical VaR ({}-day lookback)",
                lag, conf, window
            ),
            var_trace: format!(
                "{}d {}% VaR of basis change (%, {}d lookback)",
                lag, conf, window
            ),
            basis_trace,
        }
    }
}

/// Plotly figure (data + layout) as JSON
pub fn figure_json(frame: &RiskFrame) -> serde_json::Value {
    let labels = ChartLabels::from_params(&frame.params);
    let dates: Vec<String> = frame
        .rows
        .iter()
        .map(|r| r.date.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();
    // Left-tail quantile is negative; plot its magnitude
    let var_pct: Vec<Option<f64>> = frame.rows.iter().map(|r| r.var.map(|v| -v * 100.0)).collect();
    let basis_pct: Vec<Option<f64>> = frame.rows.iter().map(|r| r.basis.map(|b| b * 100.0)).collect();

    json!({
        "data": [
            {
                "type": "scatter",
                "mode": "lines",
                "name": labels.basis_trace,
                "x": dates,
                "y": basis_pct,
                "yaxis": "y2",
                "hovertemplate": "Date: %{x}<br>Basis: %{y:.3f}%<extra></extra>"
            },
            {
                "type": "scatter",
                "mode": "lines",
                "name": labels.var_trace,
                "x": dates,
                "y": var_pct,
                "yaxis": "y",
                "hovertemplate": "Date: %{x}<br>VaR: %{y:.3f}%<extra></extra>"
            }
        ],
        "layout": {
            "title": { "text": labels.title },
            "legend": {
                "orientation": "h",
                "yanchor": "bottom",
                "y": 1.02,
                "xanchor": "left",
                "x": 0
            },
            "paper_bgcolor": "white",
            "plot_bgcolor": "white",
            "xaxis": { "title": { "text": "Date" }, "gridcolor": "#ebf0f8" },
            "yaxis": { "title": { "text": "VaR (%)" }, "side": "left", "gridcolor": "#ebf0f8" },
            "yaxis2": {
                "title": { "text": "Basis (%)" },
                "side": "right",
                "overlaying": "y",
                "showgrid": false
            }
        }
    })
}

/// Full HTML page for the frame
pub fn render_basis_var_html(frame: &RiskFrame) -> Result<String> {
    let labels = ChartLabels::from_params(&frame.params);
    let figure = figure_json(frame);
    let data = script_safe(&serde_json::to_string(&figure["data"])?);
    let layout = script_safe(&serde_json::to_string(&figure["layout"])?);

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body>
<div id="basis-var-chart" style="width:100%;height:90vh;"></div>
<script>
Plotly.newPlot("basis-var-chart", {data}, {layout}, {{"responsive": true}});
</script>
</body>
</html>
"#,
        title = html_escape(&labels.title),
        cdn = PLOTLY_CDN,
        data = data,
        layout = layout,
    ))
}

/// Write the chart, creating the output directory if needed
pub fn write_basis_var_chart(frame: &RiskFrame, path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let html = render_basis_var_html(frame)?;
    fs::write(path, html)?;

    let written = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    info!("Chart written to {}", written.display());
    Ok(written)
}

fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskRow;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn frame() -> RiskFrame {
        let row = |day: u32, basis: Option<f64>, var: Option<f64>| RiskRow {
            date: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            steth_price_usd: 1.0,
            eth_price_usd: 1.0,
            basis,
            change: None,
            var,
        };
        RiskFrame {
            params: RiskParams::default(),
            rows: vec![
                row(1, Some(-0.001), None),
                row(2, Some(-0.002), Some(-0.015)),
            ],
        }
    }

    #[test]
    fn test_labels_from_default_params() {
        let labels = ChartLabels::from_params(&RiskParams::default());
        assert_eq!(
            labels.title,
            "stETH/ETH Basis and 14-Day 99% Historical VaR (720-day lookback)"
        );
        assert_eq!(labels.var_trace, "14d 99% VaR of basis change (%, 720d lookback)");
    }

    #[test]
    fn test_figure_axes_and_gaps() {
        let fig = figure_json(&frame());
        let basis = &fig["data"][0];
        let var = &fig["data"][1];

        assert_eq!(basis["yaxis"], "y2");
        assert_eq!(var["yaxis"], "y");
        assert_eq!(fig["layout"]["yaxis2"]["side"], "right");
        assert_eq!(fig["layout"]["yaxis2"]["showgrid"], false);

        assert!(var["y"][0].is_null());
        assert!((var["y"][1].as_f64().unwrap() - 1.5).abs() < 1e-12);
        assert!((basis["y"][0].as_f64().unwrap() + 0.1).abs() < 1e-12);
        assert_eq!(basis["x"][1], "2024-03-02 00:00:00");
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("charts").join("publish").join("basis.html");

        let written = write_basis_var_chart(&frame(), &path).unwrap();
        assert!(written.ends_with("basis.html"));

        let html = fs::read_to_string(&path).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains("VaR (%)"));
        assert!(html.contains("Basis (%)"));
        assert!(html.contains("null"));
    }

    #[test]
    fn test_script_safe() {
        assert_eq!(script_safe(r#""</script>""#), r#""<\/script>""#);
    }
}
