//! Document fetching with bounded, jittered retries.
//!
//! `Transport` performs exactly one attempt; `RetryingFetcher` owns the retry loop
//! and turns the last failure into a `FetchError` once the ceiling is reached.

pub mod http;

use async_trait::async_trait;
use metrics::{counter, histogram};
use rand::Rng;
use std::time::{Duration, Instant};

use crate::error::{FetchError, FetchFailure};

pub use http::HttpTransport;

/// Fetches a raw document for a URL. Implementations own their retry policy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// A single retrieval attempt with no retry logic.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_once(&self, url: &str) -> Result<String, FetchFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Base delay plus a uniform jitter in `[0, max_jitter]`.
    pub fn backoff(&self) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base_delay;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.base_delay + Duration::from_millis(extra)
    }
}

pub struct RetryingFetcher<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingFetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl<T: Transport> Fetcher for RetryingFetcher<T> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("scrape_fetch_attempts_total").increment(1);
            let t0 = Instant::now();
            let res = self.transport.get_once(url).await;
            histogram!("scrape_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let failure = match res {
                Ok(body) => {
                    tracing::debug!(url, attempt, max_attempts, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(f) => f,
            };

            counter!("scrape_fetch_failures_total").increment(1);
            if attempt >= max_attempts {
                tracing::warn!(url, attempt, max_attempts, error = %failure, "fetch giving up");
                return Err(FetchError {
                    url: url.to_string(),
                    last: failure,
                    attempts_made: attempt,
                });
            }

            let delay = self.policy.backoff();
            tracing::info!(
                url,
                attempt,
                max_attempts,
                error = %failure,
                retry_in_ms = delay.as_millis() as u64,
                "fetch attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
