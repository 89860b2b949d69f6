//! Record extraction from athlete detail pages.
//!
//! Every metric is looked up on its own: a missing label or an unparseable value
//! leaves that one metric absent and never fails the record.

pub mod document;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::{MetricKeywords, ScrapeConfig};
use crate::error::ExtractError;
use crate::model::{synthetic_name, EfficiencyRecord, Metric};

pub use document::{DocumentView, HtmlDocument, InMemoryDocument, NameSelector, TextBlock};

#[derive(Debug, Clone)]
pub struct Extractor {
    keywords: MetricKeywords,
    name: NameSelector,
}

impl Extractor {
    pub fn new(keywords: MetricKeywords, name: NameSelector) -> Self {
        Self { keywords, name }
    }

    pub fn from_config(cfg: &ScrapeConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(
            cfg.keywords.clone(),
            NameSelector::compile(&cfg.selectors.name)?,
        ))
    }

    /// Parse raw HTML and extract. Fails only if the page cannot be read at all.
    pub fn extract_html(
        &self,
        raw: &str,
        id: u32,
        captured_at: DateTime<Utc>,
    ) -> Result<EfficiencyRecord, ExtractError> {
        let doc = HtmlDocument::parse(raw, &self.name)?;
        Ok(self.extract(&doc, id, captured_at))
    }

    pub fn extract(
        &self,
        doc: &dyn DocumentView,
        id: u32,
        captured_at: DateTime<Utc>,
    ) -> EfficiencyRecord {
        let name = doc
            .heading()
            .map(|h| normalize_ws(&h))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| synthetic_name(id));

        let mut record = EfficiencyRecord {
            id,
            name,
            serve: None,
            reception: None,
            attack: None,
            block: None,
            dig: None,
            captured_at,
        };

        for m in Metric::ALL {
            let value = self.metric_value(doc, m);
            if value.is_none() {
                tracing::debug!(id, metric = m.column(), "metric absent");
            }
            record.set_metric(m, value);
        }
        record
    }

    /// First keyword alias whose block yields a number wins.
    fn metric_value(&self, doc: &dyn DocumentView, m: Metric) -> Option<f64> {
        self.keywords
            .for_metric(m)
            .iter()
            .filter(|k| !k.trim().is_empty())
            .find_map(|k| {
                doc.find_block_containing(k)
                    .and_then(|block| parse_metric(&block.text, k))
            })
    }
}

/// Parse a metric out of a labeled block's text.
///
/// The first occurrence of `label` is dropped, then every character except digits
/// and `.` is stripped (a `-` directly before the first digit is kept as sign).
/// Returns `None` when nothing numeric remains or the remainder is not a finite float.
pub fn parse_metric(block_text: &str, label: &str) -> Option<f64> {
    let without_label = strip_label(block_text, label);

    let mut out = String::with_capacity(without_label.len());
    let mut chars = without_label.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            out.push(c);
        } else if c == '-' && out.is_empty() {
            if matches!(chars.peek(), Some(d) if d.is_ascii_digit() || *d == '.') {
                out.push(c);
            }
        }
    }

    if !out.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    out.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn strip_label(text: &str, label: &str) -> String {
    let text = normalize_ws(text);
    let needle = normalize_ws(label).to_ascii_lowercase();
    if needle.is_empty() {
        return text;
    }
    // ASCII lowercasing keeps byte offsets aligned with `text`
    match text.to_ascii_lowercase().find(&needle) {
        Some(i) => format!("{}{}", &text[..i], &text[i + needle.len()..]),
        None => text,
    }
}

/// Collapse whitespace runs and trim.
pub(crate) fn normalize_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(s, " ").trim().to_string()
}
