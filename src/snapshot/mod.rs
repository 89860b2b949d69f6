//! Snapshot persistence: one immutable timestamped file set plus "latest" copies.
//!
//! Every file is written to a `.tmp` sibling first and renamed into place, so a failed
//! run never leaves a half-written snapshot behind.

pub mod csv;
pub mod markdown;

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::SnapshotError;
use crate::model::Snapshot;

pub const FILE_PREFIX: &str = "efficiencies";
pub const LISTING_DUMP_FILE: &str = "listing_latest.html";

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotWriter {
    pub write_markdown: bool,
}

impl SnapshotWriter {
    pub fn new(write_markdown: bool) -> Self {
        Self { write_markdown }
    }

    /// Write `efficiencies_<stamp>.{csv,json}` and overwrite `efficiencies_latest.*`.
    /// Returns the paths written, timestamped files first.
    pub async fn write(
        &self,
        snapshot: &Snapshot,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, SnapshotError> {
        ensure_dir(output_dir).await?;

        let csv_body = csv::render(snapshot);
        let json_body = render_json(snapshot)?;
        let md_body = self.write_markdown.then(|| markdown::render(snapshot));
        let stamp = snapshot.stamp();

        let mut files: Vec<(String, &str)> = vec![
            (format!("{FILE_PREFIX}_{stamp}.csv"), csv_body.as_str()),
            (format!("{FILE_PREFIX}_{stamp}.json"), json_body.as_str()),
            (format!("{FILE_PREFIX}_latest.csv"), csv_body.as_str()),
            (format!("{FILE_PREFIX}_latest.json"), json_body.as_str()),
        ];
        if let Some(md) = &md_body {
            files.push((format!("{FILE_PREFIX}_latest.md"), md.as_str()));
        }

        let mut written = Vec::with_capacity(files.len());
        for (name, body) in files {
            let path = output_dir.join(name);
            write_atomic(&path, body.as_bytes()).await?;
            written.push(path);
        }

        tracing::info!(
            dir = %output_dir.display(),
            stamp = %stamp,
            records = snapshot.records.len(),
            files = written.len(),
            "snapshot written"
        );
        Ok(written)
    }
}

/// JSON array of records, numeric fields `null` when absent.
pub fn render_json(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    let mut s = serde_json::to_string_pretty(&snapshot.records)?;
    s.push('\n');
    Ok(s)
}

/// Save the raw listing page next to the snapshots.
pub async fn dump_listing(output_dir: &Path, html: &str) -> Result<PathBuf, SnapshotError> {
    ensure_dir(output_dir).await?;
    let path = output_dir.join(LISTING_DUMP_FILE);
    write_atomic(&path, html.as_bytes()).await?;
    Ok(path)
}

async fn ensure_dir(dir: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| SnapshotError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write_err = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, bytes).await.map_err(write_err)?;
    if let Err(source) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(write_err(source));
    }
    Ok(())
}
