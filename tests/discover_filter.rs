// tests/discover_filter.rs
mod common;

use common::*;
use volley_efficiency_scraper::config::SelectorConfig;
use volley_efficiency_scraper::discover::{discover, discover_ids, ListingSelectors};
use volley_efficiency_scraper::error::DiscoveryError;

fn selectors() -> ListingSelectors {
    ListingSelectors::compile(&SelectorConfig::default()).unwrap()
}

#[tokio::test]
async fn listing_fixture_filters_by_gender() {
    let fetcher = FixtureFetcher::new()
        .page(listing_url(), LISTING_HTML)
        .page(LISTING_URL.replace("{gender}", "F"), LISTING_HTML);

    let men = discover_ids(&fetcher, &listing_url(), "M", &selectors())
        .await
        .unwrap();
    assert_eq!(men.into_iter().collect::<Vec<_>>(), vec![1001, 1002, 1003]);

    let women = discover_ids(&fetcher, &LISTING_URL.replace("{gender}", "F"), "F", &selectors())
        .await
        .unwrap();
    assert_eq!(women.into_iter().collect::<Vec<_>>(), vec![2001]);
}

#[tokio::test]
async fn paged_listing_stops_when_nothing_new_appears() {
    let tpl = "https://vbw.test/players?gender={gender}&page={page}";
    let page = |n: u32| tpl.replace("{gender}", "M").replace("{page}", &n.to_string());
    let second = r#"<div>
        <a href="/players/1004"><span class="gender">M</span></a>
        <a href="/players/1001"><span class="gender">M</span></a>
    </div>"#;
    let fetcher = FixtureFetcher::new()
        .page(page(1), LISTING_HTML)
        .page(page(2), second)
        .page(page(3), second)
        .page(page(4), LISTING_HTML);

    let d = discover(&fetcher, tpl, "M", &selectors(), 10).await.unwrap();
    assert_eq!(d.ids.into_iter().collect::<Vec<_>>(), vec![1001, 1002, 1003, 1004]);
    assert_eq!(d.pages_fetched, 3);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(d.first_page_html.as_deref(), Some(LISTING_HTML));
}

#[tokio::test]
async fn unreachable_listing_is_an_error() {
    let fetcher = FixtureFetcher::new();
    let err = discover_ids(&fetcher, &listing_url(), "M", &selectors())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Fetch(_)));
}
