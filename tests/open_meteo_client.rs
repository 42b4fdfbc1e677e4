/// Integration tests for the blocking Open-Meteo client against a local
/// HTTP server.
///
/// These tests verify:
/// 1. Request URL shape (coordinates, dates, daily list, timezone)
/// 2. Retry on 5xx, then success
/// 3. No retry on 4xx, with the provider's reason carried in the error
/// 4. Fresh responses are served from the cache
///
/// Run with: cargo test --test open_meteo_client

use chrono::NaiveDate;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use flocast::ingest::client::{OpenMeteoClient, RetryPolicy, WeatherApi};
use flocast::ingest::open_meteo::DailyRequest;
use flocast::model::{Coordinate, FloodError, VAR_RIVER_DISCHARGE};

const DISCHARGE_JSON: &str = r#"{
  "latitude": 12.575,
  "longitude": 106.875,
  "generationtime_ms": 0.4,
  "utc_offset_seconds": 0,
  "timezone": "GMT",
  "timezone_abbreviation": "GMT",
  "elevation": 0.0,
  "daily_units": { "time": "iso8601", "river_discharge": "m³/s" },
  "daily": {
    "time": ["2024-01-01", "2024-01-02"],
    "river_discharge": [4210.5, null]
  }
}"#;

const ERROR_JSON: &str = r#"{"error": true, "reason": "Cannot initialize WeatherVariable from invalid String value rain_sum"}"#;

/// Serves `responses` in order, one per request, and reports each request URL.
fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<String>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in responses {
            let Ok(request) = server.recv() else { return };
            tx.send(request.url().to_string()).ok();
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            request.respond(response).ok();
        }
    });

    (format!("http://127.0.0.1:{}/v1/flood", port), rx)
}

fn client(max_attempts: u32) -> OpenMeteoClient {
    OpenMeteoClient::new(
        RetryPolicy {
            max_attempts,
            backoff_factor: 0.0,
        },
        Duration::from_secs(3600),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request() -> DailyRequest {
    DailyRequest::new(
        vec![Coordinate::new(12.575, 106.875)],
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        &[VAR_RIVER_DISCHARGE],
    )
}

#[test]
fn test_fetch_parses_response_and_sends_expected_query() {
    let (url, requests) = serve(vec![(200, DISCHARGE_JSON)]);
    let api = client(1);

    let parsed = api.fetch_daily(&url, &request()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].dates.len(), 2);
    assert_eq!(parsed[0].values[VAR_RIVER_DISCHARGE], vec![Some(4210.5), None]);

    let sent = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(sent.starts_with("/v1/flood?"));
    assert!(sent.contains("start_date=2024-01-01"));
    assert!(sent.contains("end_date=2024-01-02"));
    assert!(sent.contains("daily=river_discharge"));
    assert!(sent.contains("timezone=GMT"));
    assert!(!sent.contains("models="));
}

#[test]
fn test_server_error_is_retried_then_succeeds() {
    let (url, requests) = serve(vec![(500, "oops"), (503, "busy"), (200, DISCHARGE_JSON)]);
    let api = client(5);

    let parsed = api.fetch_daily(&url, &request()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(requests.try_iter().count(), 3);
}

#[test]
fn test_retries_stop_at_max_attempts() {
    let (url, _requests) = serve(vec![(500, "oops"), (500, "oops"), (200, DISCHARGE_JSON)]);
    let api = client(2);

    let err = api.fetch_daily(&url, &request()).unwrap_err();
    assert_eq!(
        err,
        FloodError::HttpStatus {
            status: 500,
            reason: None
        }
    );
}

#[test]
fn test_client_error_is_not_retried() {
    let (url, requests) = serve(vec![(400, ERROR_JSON), (200, DISCHARGE_JSON)]);
    let api = client(5);

    let err = api.fetch_daily(&url, &request()).unwrap_err();
    match err {
        FloodError::HttpStatus { status, reason } => {
            assert_eq!(status, 400);
            assert!(reason.unwrap().contains("rain_sum"));
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
    assert_eq!(requests.try_iter().count(), 1);
}

#[test]
fn test_repeated_request_is_served_from_cache() {
    let (url, requests) = serve(vec![(200, DISCHARGE_JSON)]);
    let api = client(1);

    let first = api.fetch_daily(&url, &request()).unwrap();
    let second = api.fetch_daily(&url, &request()).unwrap();

    assert_eq!(first, second);
    assert_eq!(api.cached_responses(), 1);
    assert_eq!(requests.try_iter().count(), 1);
}
