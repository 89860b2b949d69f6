// src/snapshot/markdown.rs
use crate::model::{Snapshot, COLUMNS};

use super::csv::record_cells;

/// Human-readable table mirror of a snapshot.
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = format!(
        "# Efficiency snapshot\n\nGenerated {} UTC, {} athletes ({} without data).\n\n",
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S"),
        snapshot.records.len(),
        snapshot.degraded_count()
    );

    out.push_str(&format!("| {} |\n", COLUMNS.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(COLUMNS.len())));
    for r in &snapshot.records {
        let cells: Vec<String> = record_cells(r)
            .into_iter()
            .map(|c| c.replace('|', "\\|"))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}
