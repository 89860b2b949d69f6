// src/snapshot/csv.rs
use chrono::SecondsFormat;

use crate::model::{EfficiencyRecord, Metric, Snapshot, COLUMNS};

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn escape(field: &str) -> String {
    if needs_quotes(field) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Cells of one record in `COLUMNS` order; absent metrics are empty.
pub fn record_cells(r: &EfficiencyRecord) -> Vec<String> {
    let mut cells = Vec::with_capacity(COLUMNS.len());
    cells.push(r.id.to_string());
    cells.push(r.name.clone());
    for m in Metric::ALL {
        cells.push(r.metric(m).map(|v| v.to_string()).unwrap_or_default());
    }
    cells.push(r.captured_at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    cells
}

/// Header row plus one row per record, `\n` terminated.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for r in &snapshot.records {
        let row: Vec<String> = record_cells(r).iter().map(|c| escape(c)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
