// src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scrapeable athlete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub id: u32,
    pub detail_url: String,
}

impl EntityRef {
    /// Builds the detail URL by substituting `{id}` in `template`.
    pub fn from_template(id: u32, template: &str) -> Self {
        Self {
            id,
            detail_url: template.replace("{id}", &id.to_string()),
        }
    }
}

/// The five efficiency metrics, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Serve,
    Reception,
    Attack,
    Block,
    Dig,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Serve,
        Metric::Reception,
        Metric::Attack,
        Metric::Block,
        Metric::Dig,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Metric::Serve => "serve",
            Metric::Reception => "reception",
            Metric::Attack => "attack",
            Metric::Block => "block",
            Metric::Dig => "dig",
        }
    }
}

/// Fixed column order shared by every tabular output.
pub const COLUMNS: [&str; 8] = [
    "id",
    "name",
    "serve",
    "reception",
    "attack",
    "block",
    "dig",
    "captured_at",
];

/// One athlete's extracted statistics. `None` marks an absent metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyRecord {
    pub id: u32,
    pub name: String,
    pub serve: Option<f64>,
    pub reception: Option<f64>,
    pub attack: Option<f64>,
    pub block: Option<f64>,
    pub dig: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl EfficiencyRecord {
    /// Record with the synthetic name and no metrics; used when fetch/extract failed.
    pub fn degraded(id: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: synthetic_name(id),
            serve: None,
            reception: None,
            attack: None,
            block: None,
            dig: None,
            captured_at,
        }
    }

    pub fn metric(&self, m: Metric) -> Option<f64> {
        match m {
            Metric::Serve => self.serve,
            Metric::Reception => self.reception,
            Metric::Attack => self.attack,
            Metric::Block => self.block,
            Metric::Dig => self.dig,
        }
    }

    pub fn set_metric(&mut self, m: Metric, value: Option<f64>) {
        let slot = match m {
            Metric::Serve => &mut self.serve,
            Metric::Reception => &mut self.reception,
            Metric::Attack => &mut self.attack,
            Metric::Block => &mut self.block,
            Metric::Dig => &mut self.dig,
        };
        *slot = value;
    }

    pub fn absent_count(&self) -> usize {
        Metric::ALL
            .iter()
            .filter(|m| self.metric(**m).is_none())
            .count()
    }

    pub fn has_synthetic_name(&self) -> bool {
        self.name == synthetic_name(self.id)
    }

    pub fn is_degraded(&self) -> bool {
        self.has_synthetic_name() && self.absent_count() == Metric::ALL.len()
    }
}

pub fn synthetic_name(id: u32) -> String {
    format!("entity_{id}")
}

/// Output of one run. Records are kept sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<EfficiencyRecord>,
}

impl Snapshot {
    pub fn new(generated_at: DateTime<Utc>, mut records: Vec<EfficiencyRecord>) -> Self {
        records.sort_by_key(|r| r.id);
        Self {
            generated_at,
            records,
        }
    }

    /// Compact ISO-basic UTC stamp used in file names, e.g. `20250906T090000Z`.
    pub fn stamp(&self) -> String {
        self.generated_at.format("%Y%m%dT%H%M%SZ").to_string()
    }

    pub fn degraded_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_degraded()).count()
    }
}
