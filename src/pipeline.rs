//! Run orchestration: gate → discover → fetch+extract per athlete → persist.
//!
//! Entity-level failures become degraded records and never abort the batch.
//! Discovery and persistence failures end the run as `Failed`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::{ActiveWindow, ScrapeConfig};
use crate::discover::{discover, ListingSelectors};
use crate::error::{ExtractError, PipelineError};
use crate::extract::Extractor;
use crate::fetch::{Fetcher, HttpTransport, RetryingFetcher};
use crate::model::{EfficiencyRecord, EntityRef, Snapshot};
use crate::snapshot::{dump_listing, SnapshotWriter};

/// One-time metrics registration so series carry descriptions once a recorder is installed.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scrape_runs_total", "Pipeline runs by outcome.");
        describe_counter!("scrape_entities_total", "Athletes processed.");
        describe_counter!(
            "scrape_degraded_total",
            "Athletes recorded without data after fetch/extract failure or timeout."
        );
        describe_counter!("scrape_fetch_attempts_total", "HTTP fetch attempts.");
        describe_counter!("scrape_fetch_failures_total", "Failed HTTP fetch attempts.");
        describe_histogram!("scrape_fetch_ms", "Single fetch attempt latency in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    NotStarted,
    Gated,
    Discovering,
    Processing,
    Persisting,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::NotStarted => "not_started",
            RunStage::Gated => "gated",
            RunStage::Discovering => "discovering",
            RunStage::Processing => "processing",
            RunStage::Persisting => "persisting",
            RunStage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    OutsideWindow {
        now: DateTime<Utc>,
        window: ActiveWindow,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OutsideWindow { now, window } => write!(
                f,
                "{now} is outside the active window {} .. {}",
                window.start, window.end
            ),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(Snapshot),
    Skipped(SkipReason),
    Failed(PipelineError),
}

impl RunOutcome {
    /// Process exit code: 0 for completed/skipped runs, 1 for failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Completed(_) | RunOutcome::Skipped(_) => 0,
            RunOutcome::Failed(_) => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed(_) => "completed",
            RunOutcome::Skipped(_) => "skipped",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

pub struct Pipeline {
    cfg: ScrapeConfig,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    extractor: Arc<Extractor>,
    selectors: ListingSelectors,
    writer: SnapshotWriter,
}

impl Pipeline {
    pub fn new(
        cfg: ScrapeConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ExtractError> {
        ensure_metrics_described();
        let extractor = Arc::new(Extractor::from_config(&cfg)?);
        let selectors = ListingSelectors::compile(&cfg.selectors)?;
        let writer = SnapshotWriter::new(cfg.write_markdown);
        Ok(Self {
            cfg,
            fetcher,
            clock,
            extractor,
            selectors,
            writer,
        })
    }

    /// Production wiring: reqwest transport with retries and the system clock.
    pub fn from_config(cfg: ScrapeConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&cfg.user_agent, cfg.request_timeout())
            .context("building HTTP client")?;
        let fetcher = RetryingFetcher::new(transport, cfg.retry_policy());
        Self::new(cfg, Arc::new(fetcher), Arc::new(SystemClock)).context("compiling selectors")
    }

    pub async fn run(&self) -> RunOutcome {
        enter(RunStage::NotStarted);
        let outcome = self.run_stages().await;
        enter(RunStage::Done);
        counter!("scrape_runs_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn run_stages(&self) -> RunOutcome {
        let started = Instant::now();
        let deadline = self.cfg.run_timeout().map(|t| started + t);

        enter(RunStage::Gated);
        if let Some(reason) = self.gate(self.clock.now()) {
            tracing::info!(reason = %reason, "run skipped");
            return RunOutcome::Skipped(reason);
        }

        enter(RunStage::Discovering);
        let discovery = match discover(
            self.fetcher.as_ref(),
            &self.cfg.listing_url,
            &self.cfg.gender,
            &self.selectors,
            self.cfg.max_listing_pages,
        )
        .await
        {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, listing = %self.cfg.listing_url, "discovery failed, aborting run");
                return RunOutcome::Failed(e.into());
            }
        };

        if self.cfg.dump_listing_html {
            if let Some(html) = &discovery.first_page_html {
                match dump_listing(&self.cfg.output_dir, html).await {
                    Ok(path) => tracing::info!(path = %path.display(), "listing html saved"),
                    Err(e) => tracing::warn!(error = %e, "could not save listing html"),
                }
            }
        }

        if discovery.ids.is_empty() {
            tracing::error!(
                candidates_seen = discovery.candidates_seen,
                pages = discovery.pages_fetched,
                gender = %self.cfg.gender,
                "discovery returned ZERO athletes; if the catalog is not really empty, the listing markup has changed"
            );
        } else {
            tracing::info!(
                athletes = discovery.ids.len(),
                candidates_seen = discovery.candidates_seen,
                "discovery finished"
            );
        }

        enter(RunStage::Processing);
        let entities: Vec<EntityRef> = discovery
            .ids
            .iter()
            .map(|id| EntityRef::from_template(*id, &self.cfg.detail_url))
            .collect();
        let (records, timed_out) = self.process(&entities, deadline).await;
        let snapshot = Snapshot::new(self.clock.now(), records);

        tracing::info!(
            discovered = entities.len(),
            records = snapshot.records.len(),
            degraded = snapshot.degraded_count(),
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "processing finished"
        );

        enter(RunStage::Persisting);
        match self.writer.write(&snapshot, &self.cfg.output_dir).await {
            Ok(_) => RunOutcome::Completed(snapshot),
            Err(e) => {
                tracing::error!(error = %e, "persisting snapshot failed");
                RunOutcome::Failed(e.into())
            }
        }
    }

    fn gate(&self, now: DateTime<Utc>) -> Option<SkipReason> {
        let window = self.cfg.window?;
        (!window.contains(now)).then_some(SkipReason::OutsideWindow { now, window })
    }

    /// Fetch and extract every entity on a bounded pool. Always returns one record per
    /// entity, plus how many of them were cut off by the run deadline.
    async fn process(
        &self,
        entities: &[EntityRef],
        deadline: Option<Instant>,
    ) -> (Vec<EfficiencyRecord>, usize) {
        let concurrency = self.cfg.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<EfficiencyRecord>(concurrency * 2);
        let delay = self.cfg.request_delay();

        let mut tasks = JoinSet::new();
        for entity in entities.iter().cloned() {
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let clock = Arc::clone(&self.clock);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let record =
                    process_entity(fetcher.as_ref(), &extractor, clock.as_ref(), &entity).await;
                if tx.send(record).await.is_err() {
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            });
        }
        drop(tx);

        let mut done: HashMap<u32, EfficiencyRecord> = HashMap::with_capacity(entities.len());
        let collect = async {
            while let Some(record) = rx.recv().await {
                done.insert(record.id, record);
            }
        };
        let finished = match deadline {
            Some(at) => tokio::time::timeout_at(at, collect).await.is_ok(),
            None => {
                collect.await;
                true
            }
        };
        if !finished {
            tracing::warn!(
                completed = done.len(),
                outstanding = entities.len().saturating_sub(done.len()),
                "run timeout reached, aborting outstanding fetches"
            );
        }
        tasks.abort_all();

        let timed_out = entities.len().saturating_sub(done.len());
        let now = self.clock.now();
        let records = entities
            .iter()
            .map(|e| {
                done.remove(&e.id).unwrap_or_else(|| {
                    tracing::warn!(id = e.id, url = %e.detail_url, "no record completed, recording degraded row");
                    counter!("scrape_degraded_total").increment(1);
                    EfficiencyRecord::degraded(e.id, now)
                })
            })
            .collect();
        (records, timed_out)
    }
}

/// Fetch + extract one athlete. Errors are logged and turned into a degraded record.
pub async fn process_entity(
    fetcher: &dyn Fetcher,
    extractor: &Extractor,
    clock: &dyn Clock,
    entity: &EntityRef,
) -> EfficiencyRecord {
    counter!("scrape_entities_total").increment(1);

    let raw = match fetcher.fetch(&entity.detail_url).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(
                id = entity.id,
                url = %entity.detail_url,
                attempts = e.attempts_made,
                error = %e.last,
                "athlete fetch failed, recording degraded row"
            );
            counter!("scrape_degraded_total").increment(1);
            return EfficiencyRecord::degraded(entity.id, clock.now());
        }
    };

    match extractor.extract_html(&raw, entity.id, clock.now()) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                id = entity.id,
                url = %entity.detail_url,
                error = %e,
                "athlete page unreadable, recording degraded row"
            );
            counter!("scrape_degraded_total").increment(1);
            EfficiencyRecord::degraded(entity.id, clock.now())
        }
    }
}

fn enter(stage: RunStage) {
    tracing::info!(stage = %stage, "pipeline stage");
}
