// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod clock;
pub mod config;
pub mod discover;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod snapshot;

// ---- Re-exports for stable public API ----
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::ScrapeConfig;
pub use crate::model::{EfficiencyRecord, EntityRef, Metric, Snapshot};
pub use crate::pipeline::{Pipeline, RunOutcome, RunStage, SkipReason};
