//! volley-scrape: one pipeline run per invocation.
//! Schedule it (cron, systemd timer) during the event; the active window keeps
//! off-event invocations cheap no-ops.

use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volley_efficiency_scraper::{Pipeline, RunOutcome, ScrapeConfig};

/// Exit code for configuration/startup problems.
const EXIT_CONFIG: u8 = 2;

/// Compact logs by default, JSON lines with `SCRAPE_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("volley_efficiency_scraper=info,warn"));

    let json = std::env::var("SCRAPE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match ScrapeConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!(
        listing = %cfg.listing_url,
        gender = %cfg.gender,
        output_dir = %cfg.output_dir.display(),
        concurrency = cfg.concurrency,
        max_attempts = cfg.max_attempts,
        "config loaded"
    );

    let pipeline = match Pipeline::from_config(cfg) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let outcome = pipeline.run().await;
    match &outcome {
        RunOutcome::Completed(snapshot) => tracing::info!(
            records = snapshot.records.len(),
            degraded = snapshot.degraded_count(),
            stamp = %snapshot.stamp(),
            "run completed"
        ),
        RunOutcome::Skipped(reason) => tracing::info!(reason = %reason, "run skipped"),
        RunOutcome::Failed(e) => tracing::error!(error = %e, "run failed"),
    }
    ExitCode::from(outcome.exit_code())
}
