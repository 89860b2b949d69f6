//! Entity discovery: listing page(s) → set of athlete ids.

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;

use crate::config::SelectorConfig;
use crate::error::{DiscoveryError, ExtractError};
use crate::extract::document::{compile_selector, visible_text};
use crate::fetch::Fetcher;

/// Compiled listing-page vocabulary.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    card: Selector,
    link: Option<Selector>,
    gender: Option<Selector>,
    gender_attr: String,
}

impl ListingSelectors {
    pub fn compile(cfg: &SelectorConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            card: compile_selector(&cfg.card)?,
            link: cfg.link.as_deref().map(compile_selector).transpose()?,
            gender: cfg.gender.as_deref().map(compile_selector).transpose()?,
            gender_attr: cfg.gender_attr.clone(),
        })
    }
}

/// One card on the listing page, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCandidate {
    pub href: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub ids: BTreeSet<u32>,
    /// Cards seen across all pages, before gender/id filtering.
    pub candidates_seen: usize,
    pub pages_fetched: u32,
    /// Raw HTML of the first listing page, kept for markup diagnostics.
    pub first_page_html: Option<String>,
}

/// Substitute `{gender}` and `{page}` in a listing URL template.
pub fn listing_page_url(template: &str, gender: &str, page: u32) -> String {
    template
        .replace("{gender}", gender)
        .replace("{page}", &page.to_string())
}

/// Fetch the listing and return the ids of athletes whose gender label equals `gender`.
pub async fn discover_ids(
    fetcher: &dyn Fetcher,
    listing_url: &str,
    gender: &str,
    selectors: &ListingSelectors,
) -> Result<BTreeSet<u32>, DiscoveryError> {
    discover(fetcher, listing_url, gender, selectors, 1)
        .await
        .map(|d| d.ids)
}

/// Like `discover_ids`, but walks `{page}` templates and reports diagnostics.
///
/// Paging stops at the first page with no cards, or no new ids. Any fetch
/// failure aborts discovery; there is no partial catalog.
pub async fn discover(
    fetcher: &dyn Fetcher,
    listing_template: &str,
    gender: &str,
    selectors: &ListingSelectors,
    max_pages: u32,
) -> Result<Discovery, DiscoveryError> {
    let paged = listing_template.contains("{page}");
    let last_page = if paged { max_pages.max(1) } else { 1 };
    let mut out = Discovery::default();

    for page in 1..=last_page {
        let url = listing_page_url(listing_template, gender, page);
        let raw = fetcher.fetch(&url).await?;
        out.pages_fetched += 1;

        let candidates = parse_listing(&raw, selectors).map_err(|source| DiscoveryError::Extract {
            url: url.clone(),
            source,
        })?;
        if page == 1 {
            out.first_page_html = Some(raw);
        }

        let before = out.ids.len();
        out.candidates_seen += candidates.len();
        out.ids.extend(select_ids(&candidates, gender));
        tracing::info!(
            url = %url,
            page,
            candidates = candidates.len(),
            new_ids = out.ids.len() - before,
            "listing page parsed"
        );

        if candidates.is_empty() || (page > 1 && out.ids.len() == before) {
            break;
        }
    }
    Ok(out)
}

/// Extract all cards from a listing document.
pub fn parse_listing(
    raw: &str,
    selectors: &ListingSelectors,
) -> Result<Vec<ListingCandidate>, ExtractError> {
    if raw.trim().is_empty() {
        return Err(ExtractError::EmptyDocument);
    }
    let html = Html::parse_document(raw);

    let cards = html
        .select(&selectors.card)
        .map(|card| {
            let href = match &selectors.link {
                Some(link) => card
                    .select(link)
                    .find_map(|a| a.value().attr("href"))
                    .map(str::to_string),
                None => card.value().attr("href").map(str::to_string),
            };

            let from_child = selectors.gender.as_ref().and_then(|sel| {
                card.select(sel)
                    .map(|el| visible_text(el).trim().to_string())
                    .find(|t| !t.is_empty())
            });
            let gender = from_child.or_else(|| {
                card.value()
                    .attr(&selectors.gender_attr)
                    .map(|g| g.trim().to_string())
            });

            ListingCandidate { href, gender }
        })
        .collect();
    Ok(cards)
}

/// Keep candidates whose gender label equals `gender` exactly and whose href ends in an id.
pub fn select_ids(candidates: &[ListingCandidate], gender: &str) -> BTreeSet<u32> {
    candidates
        .iter()
        .filter(|c| c.gender.as_deref() == Some(gender))
        .filter_map(|c| c.href.as_deref().and_then(id_from_href))
        .collect()
}

/// Trailing numeric path segment of a link, e.g. `/players/159623/` → `159623`.
/// Query string and fragment are ignored; zero is not a valid id.
pub fn id_from_href(href: &str) -> Option<u32> {
    static RE_ID: OnceCell<Regex> = OnceCell::new();
    let re = RE_ID.get_or_init(|| Regex::new(r"/(\d+)/?$").expect("static regex"));

    let path = href.split(['?', '#']).next().unwrap_or_default();
    re.captures(path)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|id| *id > 0)
}
