// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use volley_efficiency_scraper::error::{FetchError, FetchFailure};
use volley_efficiency_scraper::fetch::Fetcher;
use volley_efficiency_scraper::ScrapeConfig;

pub const LISTING_URL: &str = "https://vbw.test/players?gender={gender}";
pub const DETAIL_URL: &str = "https://vbw.test/players/{id}";

pub const LISTING_HTML: &str = include_str!("../fixtures/listing.html");
pub const PLAYER_FULL_HTML: &str = include_str!("../fixtures/player_full.html");
pub const PLAYER_PARTIAL_HTML: &str = include_str!("../fixtures/player_partial.html");

pub fn listing_url() -> String {
    LISTING_URL.replace("{gender}", "M")
}

pub fn detail_url(id: u32) -> String {
    DETAIL_URL.replace("{id}", &id.to_string())
}

pub fn during_event() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 5, 12, 0, 0).unwrap()
}

pub fn test_config(out: &Path) -> ScrapeConfig {
    ScrapeConfig {
        listing_url: LISTING_URL.to_string(),
        detail_url: DETAIL_URL.to_string(),
        output_dir: out.to_path_buf(),
        window: None,
        run_timeout_secs: None,
        request_delay_ms: 0,
        ..ScrapeConfig::default()
    }
}

/// Serves canned pages by URL; unknown or failing URLs return a 503 `FetchError`.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, body: &str) -> Self {
        self.pages.insert(url.into(), body.to_string());
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// The URL never answers (simulates a stuck connection).
    pub fn hanging(mut self, url: impl Into<String>) -> Self {
        self.hanging.insert(url.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(url) {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        if !self.failing.contains(url) {
            if let Some(body) = self.pages.get(url) {
                return Ok(body.clone());
            }
        }
        Err(FetchError {
            url: url.to_string(),
            last: FetchFailure::Status(503),
            attempts_made: 5,
        })
    }
}
