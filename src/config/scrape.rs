// src/config/scrape.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discover::ListingSelectors;
use crate::error::ConfigError;
use crate::extract::NameSelector;
use crate::fetch::RetryPolicy;
use crate::model::Metric;

const ENV_PATH: &str = "SCRAPE_CONFIG_PATH";
const MAX_CONCURRENCY: usize = 32;

const DEFAULT_LISTING_URL: &str = "https://en.volleyballworld.com/beachvolleyball/competitions/beach-volleyball-world-championships/players/?gender={gender}";
const DEFAULT_DETAIL_URL: &str = "https://en.volleyballworld.com/beachvolleyball/competitions/beach-volleyball-world-championships/players/{id}";

/// UTC range in which a run is allowed to scrape (inclusive on both ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActiveWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

/// CSS vocabulary of the listing and detail pages. Changes whenever the site does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// One match per player card on the listing page.
    pub card: String,
    /// Anchor inside the card; when unset the card itself carries `href`.
    pub link: Option<String>,
    /// Element inside the card whose text is the gender label.
    pub gender: Option<String>,
    /// Card attribute read when `gender` is unset or matches nothing.
    pub gender_attr: String,
    /// Display name on the detail page.
    pub name: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: "a[href*='/players/']".to_string(),
            link: None,
            gender: Some(".gender".to_string()),
            gender_attr: "data-gender".to_string(),
            name: "h1".to_string(),
        }
    }
}

/// Label keywords per metric, tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricKeywords {
    pub serve: Vec<String>,
    pub reception: Vec<String>,
    pub attack: Vec<String>,
    pub block: Vec<String>,
    pub dig: Vec<String>,
}

impl Default for MetricKeywords {
    fn default() -> Self {
        fn v(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            serve: v(&["Serve efficiency", "Serving efficiency"]),
            reception: v(&["Reception efficiency", "Receive efficiency"]),
            attack: v(&["Attack efficiency"]),
            block: v(&["Block efficiency"]),
            dig: v(&["Dig efficiency"]),
        }
    }
}

impl MetricKeywords {
    pub fn for_metric(&self, m: Metric) -> &[String] {
        match m {
            Metric::Serve => &self.serve,
            Metric::Reception => &self.reception,
            Metric::Attack => &self.attack,
            Metric::Block => &self.block,
            Metric::Dig => &self.dig,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Listing page template; `{gender}` and `{page}` are substituted.
    pub listing_url: String,
    /// Detail page template; must contain `{id}`.
    pub detail_url: String,
    /// Exact gender label a card must carry to be scraped.
    pub gender: String,
    /// Upper bound on listing pages walked when `listing_url` has `{page}`.
    pub max_listing_pages: u32,
    pub output_dir: PathBuf,
    /// No window means every run is active.
    pub window: Option<ActiveWindow>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub concurrency: usize,
    pub run_timeout_secs: Option<u64>,
    pub request_timeout_secs: u64,
    /// Pause after each detail fetch, per worker slot.
    pub request_delay_ms: u64,
    pub user_agent: String,
    pub write_markdown: bool,
    pub dump_listing_html: bool,
    pub selectors: SelectorConfig,
    pub keywords: MetricKeywords,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            detail_url: DEFAULT_DETAIL_URL.to_string(),
            gender: "M".to_string(),
            max_listing_pages: 1,
            output_dir: PathBuf::from("data"),
            window: None,
            max_attempts: 5,
            base_delay_ms: 2_000,
            jitter_ms: 2_000,
            concurrency: 4,
            run_timeout_secs: Some(1_800),
            request_timeout_secs: 30,
            request_delay_ms: 500,
            user_agent: "volley-efficiency-scraper/0.1".to_string(),
            write_markdown: true,
            dump_listing_html: false,
            selectors: SelectorConfig::default(),
            keywords: MetricKeywords::default(),
        }
    }
}

impl ScrapeConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, &ext).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Resolve config via env var + fallbacks, then apply env overrides and validate:
    /// 1) $SCRAPE_CONFIG_PATH
    /// 2) config/scrape.toml
    /// 3) config/scrape.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_base()?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn load_base() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(ConfigError::MissingPath(pb));
        }
        let toml_p = PathBuf::from("config/scrape.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/scrape.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    /// Apply `SCRAPE_*` overrides from `lookup` (the process env in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("SCRAPE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SCRAPE_LISTING_URL") {
            self.listing_url = v;
        }
        if let Some(v) = get("SCRAPE_DETAIL_URL") {
            self.detail_url = v;
        }
        if let Some(v) = get("SCRAPE_GENDER") {
            self.gender = v;
        }

        let start = get("SCRAPE_WINDOW_START")
            .map(|v| parse_instant("SCRAPE_WINDOW_START", &v))
            .transpose()?;
        let end = get("SCRAPE_WINDOW_END")
            .map(|v| parse_instant("SCRAPE_WINDOW_END", &v))
            .transpose()?;
        match (start, end, self.window) {
            (None, None, _) => {}
            (Some(start), Some(end), _) => self.window = Some(ActiveWindow { start, end }),
            (Some(start), None, Some(w)) => self.window = Some(ActiveWindow { start, ..w }),
            (None, Some(end), Some(w)) => self.window = Some(ActiveWindow { end, ..w }),
            _ => {
                return Err(ConfigError::invalid(
                    "SCRAPE_WINDOW_START/SCRAPE_WINDOW_END",
                    "both bounds are required when no window is configured",
                ))
            }
        }

        if let Some(v) = get("SCRAPE_MAX_ATTEMPTS") {
            self.max_attempts = parse_num("SCRAPE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("SCRAPE_BASE_DELAY_MS") {
            self.base_delay_ms = parse_num("SCRAPE_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("SCRAPE_JITTER_MS") {
            self.jitter_ms = parse_num("SCRAPE_JITTER_MS", &v)?;
        }
        if let Some(v) = get("SCRAPE_CONCURRENCY") {
            self.concurrency = parse_num("SCRAPE_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("SCRAPE_RUN_TIMEOUT_SECS") {
            let secs: u64 = parse_num("SCRAPE_RUN_TIMEOUT_SECS", &v)?;
            // 0 disables the run-level timeout
            self.run_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = get("SCRAPE_REQUEST_DELAY_MS") {
            self.request_delay_ms = parse_num("SCRAPE_REQUEST_DELAY_MS", &v)?;
        }
        if let Some(v) = get("SCRAPE_WRITE_MARKDOWN") {
            self.write_markdown = parse_flag("SCRAPE_WRITE_MARKDOWN", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.detail_url.contains("{id}") {
            return Err(ConfigError::invalid("detail_url", "template must contain {id}"));
        }
        if self.listing_url.trim().is_empty() {
            return Err(ConfigError::invalid("listing_url", "must not be empty"));
        }
        if self.gender.trim().is_empty() {
            return Err(ConfigError::invalid("gender", "must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!("must be within 1..={MAX_CONCURRENCY}"),
            ));
        }
        if self.max_listing_pages == 0 {
            return Err(ConfigError::invalid("max_listing_pages", "must be at least 1"));
        }
        if let Some(w) = self.window {
            if w.start > w.end {
                return Err(ConfigError::invalid("window", "start is after end"));
            }
        }
        for m in Metric::ALL {
            if self.keywords.for_metric(m).iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    &format!("keywords.{}", m.column()),
                    "needs at least one keyword",
                ));
            }
        }

        let to_cfg_err = |e: crate::error::ExtractError| ConfigError::invalid("selectors", e.to_string());
        ListingSelectors::compile(&self.selectors).map_err(to_cfg_err)?;
        NameSelector::compile(&self.selectors.name).map_err(to_cfg_err)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.jitter_ms),
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<ScrapeConfig, String> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str::<ScrapeConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => {
            if hint_ext == "toml" {
                return Err(toml_err.to_string());
            }
            serde_json::from_str(s).map_err(|e| format!("not TOML ({toml_err}) nor JSON ({e})"))
        }
    }
}

fn parse_instant(key: &str, v: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(v)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

fn parse_num<T>(key: &str, v: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    v.parse::<T>().map_err(|e| ConfigError::invalid(key, e.to_string()))
}

fn parse_flag(key: &str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("not a boolean: {other}"))),
    }
}
