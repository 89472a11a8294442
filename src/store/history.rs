use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{HistoryStore, write_json};
use crate::model::{DatedSnapshot, HistorySnapshot, Rollup};
use crate::util::time::parse_date_stem;

/// Reads `history_dir/YYYY-MM-DD.json` and writes `out_dir/top500_{range}.json`.
#[derive(Debug, Clone)]
pub struct FsHistoryStore {
    history_dir: PathBuf,
    out_dir: PathBuf,
}

impl FsHistoryStore {
    #[must_use]
    pub fn new(history_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
            out_dir: out_dir.into(),
        }
    }

    #[must_use]
    pub fn rollup_path(&self, range: &str) -> PathBuf {
        self.out_dir.join(format!("top500_{range}.json"))
    }
}

#[async_trait]
impl HistoryStore for FsHistoryStore {
    async fn load_history(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DatedSnapshot>> {
        let mut entries = match tokio::fs::read_dir(&self.history_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.history_dir.display(), "history directory is absent");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to list history in {}", self.history_dir.display())
                });
            }
        };

        let mut dated_files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(date) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(parse_date_stem)
            else {
                continue;
            };
            if date >= from && date <= to {
                dated_files.push((date, path));
            }
        }
        dated_files.sort();

        let mut snapshots = Vec::with_capacity(dated_files.len());
        for (date, path) in dated_files {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable history snapshot");
                    continue;
                }
            };
            match serde_json::from_str::<HistorySnapshot>(&contents) {
                Ok(snapshot) => snapshots.push(DatedSnapshot { date, snapshot }),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed history snapshot");
                }
            }
        }

        debug!(loaded = snapshots.len(), %from, %to, "history loaded");
        Ok(snapshots)
    }

    async fn write_rollup(&self, rollup: &Rollup) -> Result<PathBuf> {
        let path = self.rollup_path(&rollup.range);
        write_json(&path, rollup).await?;
        Ok(path)
    }
}
