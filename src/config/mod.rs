pub mod scrape;

pub use scrape::{ActiveWindow, MetricKeywords, ScrapeConfig, SelectorConfig};
