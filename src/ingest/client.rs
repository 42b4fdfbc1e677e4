/// HTTP client for the Open-Meteo daily endpoints, with bounded retry and an
/// in-process response cache.
///
/// Callers depend on the `WeatherApi` trait, not on this client, so tests can
/// substitute a fake that never touches the network.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use super::open_meteo::{build_daily_url, parse_daily_response, parse_error_reason, DailyRequest, LocationDaily};
use crate::model::FloodError;

/// Source of daily series for one or more locations.
pub trait WeatherApi {
    /// Fetches `request` from the endpoint at `base_url`, returning one entry
    /// per requested location in request order.
    fn fetch_daily(&self, base_url: &str, request: &DailyRequest) -> Result<Vec<LocationDaily>, FloodError>;
}

/// Retry schedule for recoverable failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Seconds; the wait after failed attempt `n` is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16) as i32;
        Duration::from_secs_f64((self.backoff_factor * 2f64.powi(exponent)).max(0.0))
    }
}

struct CachedBody {
    body: String,
    fetched_at: Instant,
}

/// Blocking Open-Meteo client. Not shared across threads.
pub struct OpenMeteoClient {
    http: reqwest::blocking::Client,
    retry: RetryPolicy,
    cache_ttl: Duration,
    cache: RefCell<HashMap<String, CachedBody>>,
}

impl OpenMeteoClient {
    pub fn new(retry: RetryPolicy, cache_ttl: Duration, timeout: Duration) -> Result<Self, FloodError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(OpenMeteoClient {
            http,
            retry,
            cache_ttl,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Client with the default retry policy, a one-hour cache and a 60 s
    /// request timeout.
    pub fn with_defaults() -> Result<Self, FloodError> {
        Self::new(
            RetryPolicy::default(),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
    }

    /// Number of unexpired cached responses.
    pub fn cached_responses(&self) -> usize {
        self.cache
            .borrow()
            .values()
            .filter(|c| c.fetched_at.elapsed() < self.cache_ttl)
            .count()
    }

    /// GETs `url`, serving from cache when fresh and retrying recoverable
    /// failures per the retry policy.
    pub fn get_body(&self, url: &str) -> Result<String, FloodError> {
        if let Some(body) = self.cached_body(url) {
            tracing::debug!(url, "serving cached response");
            return Ok(body);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        let body = loop {
            match self.get_once(url) {
                Ok(body) => break body,
                Err(e) if e.is_recoverable() && attempt < max_attempts => {
                    let wait = self.retry.backoff(attempt);
                    tracing::warn!(
                        url,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        self.evict_expired();
        self.cache.borrow_mut().insert(
            url.to_string(),
            CachedBody {
                body: body.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(body)
    }

    /// Fresh cached body for `url`. A stale entry is evicted.
    fn cached_body(&self, url: &str) -> Option<String> {
        let mut cache = self.cache.borrow_mut();
        let fresh = cache.get(url)?.fetched_at.elapsed() < self.cache_ttl;
        if fresh {
            cache.get(url).map(|c| c.body.clone())
        } else {
            cache.remove(url);
            None
        }
    }

    /// Drops every expired entry.
    pub fn evict_expired(&self) -> usize {
        let mut cache = self.cache.borrow_mut();
        let before = cache.len();
        cache.retain(|_, c| c.fetched_at.elapsed() < self.cache_ttl);
        before - cache.len()
    }

    fn get_once(&self, url: &str) -> Result<String, FloodError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(FloodError::HttpStatus {
                status: status.as_u16(),
                reason: parse_error_reason(&body),
            });
        }
        Ok(body)
    }
}

impl WeatherApi for OpenMeteoClient {
    fn fetch_daily(&self, base_url: &str, request: &DailyRequest) -> Result<Vec<LocationDaily>, FloodError> {
        let url = build_daily_url(base_url, request);
        tracing::debug!(url = %url, locations = request.locations.len(), "fetching daily series");

        let body = self.get_body(&url)?;
        let parsed = parse_daily_response(&body)?;
        if parsed.len() != request.locations.len() {
            return Err(FloodError::ShapeMismatch(format!(
                "requested {} locations, response has {}",
                request.locations.len(),
                parsed.len()
            )));
        }
        Ok(parsed)
    }
}
