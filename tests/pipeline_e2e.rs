// tests/pipeline_e2e.rs
mod common;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use volley_efficiency_scraper::config::ActiveWindow;
use volley_efficiency_scraper::error::{FetchError, PipelineError};
use volley_efficiency_scraper::fetch::Fetcher;
use volley_efficiency_scraper::{FixedClock, Pipeline, RunOutcome, SkipReason};

fn full_catalog() -> FixtureFetcher {
    FixtureFetcher::new()
        .page(listing_url(), LISTING_HTML)
        .page(detail_url(1001), PLAYER_FULL_HTML)
        .page(detail_url(1002), PLAYER_FULL_HTML)
        .page(detail_url(1003), PLAYER_PARTIAL_HTML)
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn every_discovered_athlete_gets_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let p = Pipeline::new(
        test_config(dir.path()),
        Arc::new(full_catalog()),
        Arc::new(FixedClock(during_event())),
    )
    .unwrap();

    let RunOutcome::Completed(snap) = p.run().await else {
        panic!("run did not complete");
    };
    let ids: Vec<u32> = snap.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1001, 1002, 1003]);

    let full = &snap.records[0];
    assert_eq!(full.name, "Anders Mol");
    assert_eq!(full.absent_count(), 0);
    assert_eq!(full.serve, Some(45.6));
    assert_eq!(full.dig, Some(30.1));

    let partial = &snap.records[2];
    assert!(partial.has_synthetic_name());
    assert_eq!(partial.name, "entity_1003");
    assert_eq!(partial.serve, Some(40.0));
    assert_eq!(partial.attack, None);
    assert_eq!(partial.absent_count(), 4);

    assert_eq!(
        file_names(dir.path()),
        vec![
            "efficiencies_20250905T120000Z.csv",
            "efficiencies_20250905T120000Z.json",
            "efficiencies_latest.csv",
            "efficiencies_latest.json",
            "efficiencies_latest.md",
        ]
    );
    let csv = std::fs::read_to_string(dir.path().join("efficiencies_latest.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn failing_athletes_are_recorded_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = full_catalog()
        .failing(detail_url(1002))
        .page(detail_url(1003), "   ");
    let p = Pipeline::new(
        test_config(dir.path()),
        Arc::new(fetcher),
        Arc::new(FixedClock(during_event())),
    )
    .unwrap();

    let outcome = p.run().await;
    assert_eq!(outcome.exit_code(), 0);
    let RunOutcome::Completed(snap) = outcome else {
        panic!("run did not complete");
    };
    assert_eq!(snap.records.len(), 3);
    assert_eq!(snap.degraded_count(), 2);
    assert!(!snap.records[0].is_degraded());
    for r in &snap.records[1..] {
        assert!(r.is_degraded());
        assert_eq!(r.name, format!("entity_{}", r.id));
        assert_eq!(r.captured_at, during_event());
    }

    let json = std::fs::read_to_string(dir.path().join("efficiencies_latest.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v[1]["id"], 1002);
    assert!(v[1]["serve"].is_null());
}

async fn run_and_read_latest(dir: &std::path::Path) -> (Vec<u8>, Vec<u8>) {
    let p = Pipeline::new(
        test_config(dir),
        Arc::new(full_catalog()),
        Arc::new(FixedClock(during_event())),
    )
    .unwrap();
    assert!(matches!(p.run().await, RunOutcome::Completed(_)));
    (
        std::fs::read(dir.join("efficiencies_latest.json")).unwrap(),
        std::fs::read(dir.join("efficiencies_latest.csv")).unwrap(),
    )
}

#[tokio::test]
async fn rerun_with_same_inputs_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let first = run_and_read_latest(dir.path()).await;
    let second = run_and_read_latest(dir.path()).await;
    assert_eq!(first, second);

    let stamped_json =
        std::fs::read(dir.path().join("efficiencies_20250905T120000Z.json")).unwrap();
    let stamped_csv = std::fs::read(dir.path().join("efficiencies_20250905T120000Z.csv")).unwrap();
    assert_eq!(second, (stamped_json, stamped_csv));
}

#[tokio::test]
async fn outside_window_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let window = ActiveWindow {
        start: Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2025, 9, 14, 0, 0, 0).unwrap(),
    };

    for now in [
        Utc.with_ymd_and_hms(2025, 8, 31, 23, 59, 59).unwrap(),
        Utc.with_ymd_and_hms(2025, 9, 14, 0, 0, 1).unwrap(),
    ] {
        let fetcher = Arc::new(full_catalog());
        let cfg = volley_efficiency_scraper::ScrapeConfig {
            window: Some(window),
            ..test_config(&out)
        };
        let p = Pipeline::new(cfg, fetcher.clone(), Arc::new(FixedClock(now))).unwrap();
        let outcome = p.run().await;
        assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::OutsideWindow { .. })));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(fetcher.calls(), 0);
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn window_bounds_are_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
    let cfg = volley_efficiency_scraper::ScrapeConfig {
        window: Some(ActiveWindow {
            start,
            end: Utc.with_ymd_and_hms(2025, 9, 14, 0, 0, 0).unwrap(),
        }),
        ..test_config(dir.path())
    };
    let p = Pipeline::new(cfg, Arc::new(full_catalog()), Arc::new(FixedClock(start))).unwrap();
    assert!(matches!(p.run().await, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn empty_catalog_still_writes_header_only_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = FixtureFetcher::new().page(
        listing_url(),
        "<html><body><p>No players announced yet</p></body></html>",
    );
    let p = Pipeline::new(
        test_config(dir.path()),
        Arc::new(fetcher),
        Arc::new(FixedClock(during_event())),
    )
    .unwrap();

    let RunOutcome::Completed(snap) = p.run().await else {
        panic!("run did not complete");
    };
    assert!(snap.records.is_empty());
    let csv = std::fs::read_to_string(dir.path().join("efficiencies_latest.csv")).unwrap();
    assert_eq!(csv, "id,name,serve,reception,attack,block,dig,captured_at\n");
    let json = std::fs::read_to_string(dir.path().join("efficiencies_latest.json")).unwrap();
    assert_eq!(json.trim(), "[]");
}

#[tokio::test]
async fn listing_dump_is_written_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = volley_efficiency_scraper::ScrapeConfig {
        dump_listing_html: true,
        write_markdown: false,
        ..test_config(dir.path())
    };
    let p = Pipeline::new(cfg, Arc::new(full_catalog()), Arc::new(FixedClock(during_event())))
        .unwrap();
    assert!(matches!(p.run().await, RunOutcome::Completed(_)));

    let dumped = std::fs::read_to_string(dir.path().join("listing_latest.html")).unwrap();
    assert_eq!(dumped, LISTING_HTML);
    assert!(!dir.path().join("efficiencies_latest.md").exists());
}

#[tokio::test(start_paused = true)]
async fn run_timeout_fills_unfinished_athletes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = volley_efficiency_scraper::ScrapeConfig {
        run_timeout_secs: Some(1),
        ..test_config(dir.path())
    };
    let fetcher = full_catalog().hanging(detail_url(1002));
    let p = Pipeline::new(cfg, Arc::new(fetcher), Arc::new(FixedClock(during_event()))).unwrap();

    let RunOutcome::Completed(snap) = p.run().await else {
        panic!("run did not complete");
    };
    let ids: Vec<u32> = snap.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1001, 1002, 1003]);
    assert!(!snap.records[0].is_degraded());
    assert!(snap.records[1].is_degraded());
    assert_eq!(snap.records[1].name, "entity_1002");
}

/// Serves a six-athlete listing and slow detail pages, tracking peak in-flight detail fetches.
#[derive(Default)]
struct SlowCatalog {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

const SIX_ATHLETES: &str = r#"<div>
    <a href="/players/1"><span class="gender">M</span></a>
    <a href="/players/2"><span class="gender">M</span></a>
    <a href="/players/3"><span class="gender">M</span></a>
    <a href="/players/4"><span class="gender">M</span></a>
    <a href="/players/5"><span class="gender">M</span></a>
    <a href="/players/6"><span class="gender">M</span></a>
</div>"#;

#[async_trait]
impl Fetcher for SlowCatalog {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if url == listing_url() {
            return Ok(SIX_ATHLETES.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(PLAYER_FULL_HTML.to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn detail_fetches_respect_concurrency_bound() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = volley_efficiency_scraper::ScrapeConfig {
        concurrency: 2,
        ..test_config(dir.path())
    };
    let fetcher = Arc::new(SlowCatalog::default());
    let p = Pipeline::new(cfg, fetcher.clone(), Arc::new(FixedClock(during_event()))).unwrap();

    let RunOutcome::Completed(snap) = p.run().await else {
        panic!("run did not complete");
    };
    assert_eq!(snap.records.len(), 6);
    assert_eq!(snap.degraded_count(), 0);
    assert_eq!(fetcher.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unwritable_output_dir_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    let p = Pipeline::new(
        test_config(&blocker.join("snapshots")),
        Arc::new(full_catalog()),
        Arc::new(FixedClock(during_event())),
    )
    .unwrap();
    let outcome = p.run().await;
    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(outcome, RunOutcome::Failed(PipelineError::Persist(_))));
}
