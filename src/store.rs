//! Output persistence: ranked snapshots, history, rollups and diagnostics.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::model::{Candidate, CandidateId, DatedSnapshot, EntityRecord, Rollup, ScoredRow, Snapshot};
use crate::pipeline::filter::Rejection;

pub mod history;
pub mod snapshot;

pub use history::FsHistoryStore;
pub use snapshot::{FsSnapshotStore, SnapshotPaths, export_channel_list};

/// Files written for one published snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedSnapshot {
    pub rows: usize,
    pub files: Vec<PathBuf>,
}

/// One rejected publisher, for the under-yield dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionRecord {
    pub channel_id: CandidateId,
    pub stage: &'static str,
    pub detail: Rejection,
}

/// Intermediate state dumped when a run under-yields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub generated_at_utc: DateTime<Utc>,
    pub min_rows: usize,
    pub candidates: Vec<Candidate>,
    pub entities: Vec<EntityRecord>,
    pub rejections: Vec<RejectionRecord>,
    pub rows: Vec<ScoredRow>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Whether a published snapshot already exists.
    async fn snapshot_exists(&self) -> Result<bool>;

    /// Writes the ranked table, the JSON snapshot and its dated history copy.
    async fn publish(&self, snapshot: &Snapshot) -> Result<PublishedSnapshot>;

    /// Dumps diagnostics without touching the published snapshot.
    async fn write_diagnostics(&self, diagnostics: &Diagnostics) -> Result<PathBuf>;

    /// Appends ids not yet in the discovered-id cache. Returns how many were new.
    async fn append_discovered(&self, ids: &[CandidateId]) -> Result<usize>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Loads readable snapshots dated within `[from, to]`.
    async fn load_history(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DatedSnapshot>>;

    async fn write_rollup(&self, rollup: &Rollup) -> Result<PathBuf>;
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&directory)
        .await
        .with_context(|| format!("failed to create directory {}", directory.display()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let temp_path = directory.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Err(err) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| format!("failed to move output into {}", path.display()));
    }
    Ok(())
}

/// Pretty JSON with a trailing newline, written atomically.
pub(crate) async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).context("failed to serialize JSON output")?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).await
}
