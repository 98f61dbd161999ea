//! Unit tests for client module

#[cfg(test)]
mod tests {
    use super::super::dune::*;
    use super::super::*;
    use crate::config::DuneConfig;
    use crate::error::PegError;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[test]
    fn test_parse_query_results_sorted() {
        let body = r#"{
            "execution_id": "01H",
            "result": {
                "rows": [
                    {"date": "2024-01-03 00:00:00.000 UTC", "steth_price_usd": 2210.5, "eth_price_usd": 2215.0},
                    {"date": "2024-01-01 00:00:00.000 UTC", "steth_price_usd": 2350.1, "eth_price_usd": 2352.0},
                    {"date": "2024-01-02 00:00:00.000 UTC", "steth_price_usd": "2355.0", "eth_price_usd": "2356.25", "extra": 1}
                ]
            }
        }"#;

        let series = parse_query_results(body).unwrap();
        assert_eq!(series.len(), 3);
        let dates: Vec<_> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates[0], Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(dates[2], Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(series.points()[1].steth_price_usd, 2355.0);
        assert_eq!(series.points()[1].eth_price_usd, 2356.25);
    }

    #[test]
    fn test_missing_columns_is_error() {
        let body = r#"{"result": {"rows": [{"date": "2024-01-01", "steth_price_usd": 1.0}]}}"#;
        match parse_query_results(body) {
            Err(PegError::MissingColumns(cols)) => assert_eq!(cols, vec!["eth_price_usd"]),
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_column_names_case_sensitive() {
        let body = r#"{"result": {"rows": [{"Date": "2024-01-01", "STETH_PRICE_USD": 1.0, "eth_price_usd": 1.0}]}}"#;
        match parse_query_results(body) {
            Err(PegError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["date", "steth_price_usd"]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_rows_missing_everything() {
        let body = r#"{"result": {"rows": []}}"#;
        let err = parse_query_results(body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query results missing required columns: date, steth_price_usd, eth_price_usd"
        );
    }

    #[test]
    fn test_null_price_becomes_nan() {
        let body = r#"{"result": {"rows": [{"date": "2024-01-01", "steth_price_usd": null, "eth_price_usd": 2000}]}}"#;
        let series = parse_query_results(body).unwrap();
        assert!(series.points()[0].steth_price_usd.is_nan());
        assert_eq!(series.points()[0].eth_price_usd, 2000.0);
    }

    #[test]
    fn test_bad_price_string_is_error() {
        let body = r#"{"result": {"rows": [{"date": "2024-01-01", "steth_price_usd": "abc", "eth_price_usd": 2000}]}}"#;
        assert!(matches!(
            parse_query_results(body),
            Err(PegError::InvalidData(_))
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        let midnight = Utc.with_ymd_and_hms(2023, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2023-06-15 00:00:00.000 UTC"), Some(midnight));
        assert_eq!(parse_date("2023-06-15T00:00:00Z"), Some(midnight));
        assert_eq!(parse_date("2023-06-15T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_date("2023-06-15"), Some(midnight));
        assert_eq!(parse_date("15/06/2023"), None);
    }

    #[test]
    fn test_results_url() {
        let config = DuneConfig {
            base_url: "https://api.dune.com/api/v1/".to_string(),
            ..Default::default()
        };
        let client = DuneClient::new(&config, "key".to_string(), 3_456_789).unwrap();
        assert_eq!(
            client.results_url(),
            "https://api.dune.com/api/v1/query/3456789/results"
        );
        assert_eq!(client.name(), "dune");
    }

    #[tokio::test]
    async fn test_mock_price_source() {
        let mut source = MockPriceSource::new();
        source
            .expect_fetch_prices()
            .times(1)
            .returning(|| Ok(crate::types::PriceSeries::default()));

        let series = source.fetch_prices().await.unwrap();
        assert!(series.is_empty());
    }

    /// One-shot HTTP server on loopback. Returns the base URL and a handle
    /// resolving to the raw request head it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn loopback_client(base_url: String) -> DuneClient {
        let config = DuneConfig {
            base_url,
            timeout_secs: 5,
            ..Default::default()
        };
        DuneClient::new(&config, "secret-key".to_string(), 42).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_api_key_header() {
        let body = r#"{"result": {"rows": [
            {"date": "2024-01-02 00:00:00.000 UTC", "steth_price_usd": 2355.0, "eth_price_usd": 2356.0},
            {"date": "2024-01-01 00:00:00.000 UTC", "steth_price_usd": 2350.0, "eth_price_usd": 2352.0}
        ]}}"#;
        let (base_url, server) = serve_once("200 OK", body).await;
        let client = loopback_client(base_url);

        let series = client.fetch_prices().await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.first().unwrap().date,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /query/42/results "));
        assert!(request.contains("x-dune-api-key: secret-key\r\n"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_http_error() {
        let (base_url, server) =
            serve_once("401 Unauthorized", r#"{"error": "invalid API Key"}"#).await;
        let client = loopback_client(base_url);

        match client.fetch_query_results().await {
            Err(PegError::Http(e)) => {
                assert_eq!(e.status(), Some(reqwest::StatusCode::UNAUTHORIZED))
            }
            other => panic!("expected an HTTP status error, got {:?}", other),
        }
        server.await.unwrap();
    }
}
