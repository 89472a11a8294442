//! Filesystem snapshot store: ranked CSV, JSON snapshot, dated history copy,
//! under-yield diagnostics and the discovered-id cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use super::{Diagnostics, PublishedSnapshot, SnapshotStore, write_atomic, write_json};
use crate::model::{CandidateId, ScoredRow, Snapshot};
use crate::pipeline::sources::parse_id_lines;

pub const RANKED_HEADER: [&str; 18] = [
    "rank",
    "channel_id",
    "channel_url",
    "channel_name",
    "channel_description",
    "subscribers",
    "video_count",
    "views_total",
    "country",
    "classification",
    "latest_video_id",
    "latest_video_title",
    "latest_video_thumbnail",
    "latest_video_published_at",
    "latest_video_duration_sec",
    "score",
    "discovered_via",
    "generated_at_utc",
];

pub const CHANNEL_LIST_HEADER: [&str; 3] = ["rank", "channel_id", "channel_name"];

/// Where each output of a build run lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub csv: PathBuf,
    pub json: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub diagnostics_dir: PathBuf,
    pub discovered_cache: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    paths: SnapshotPaths,
}

impl FsSnapshotStore {
    #[must_use]
    pub fn new(paths: SnapshotPaths) -> Self {
        Self { paths }
    }

    #[must_use]
    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn csv_record(row: &ScoredRow) -> [String; 18] {
    [
        row.rank.to_string(),
        row.channel_id.to_string(),
        row.channel_url.clone(),
        row.channel_name.clone(),
        row.channel_description.clone(),
        row.subscribers.to_string(),
        row.video_count.to_string(),
        row.views_total.to_string(),
        row.country.clone(),
        row.classification.to_string(),
        row.latest_video_id.clone(),
        row.latest_video_title.clone(),
        row.latest_video_thumbnail.clone(),
        row.latest_video_published_at
            .map(format_timestamp)
            .unwrap_or_default(),
        row.latest_video_duration_sec.to_string(),
        row.score.to_string(),
        row.discovered_via.as_str().to_string(),
        format_timestamp(row.generated_at_utc),
    ]
}

/// Renders the ranked table. Zero rows still produce the header line.
///
/// # Errors
/// Fails only if the CSV writer cannot encode a record.
pub fn render_ranked_csv(rows: &[ScoredRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(RANKED_HEADER)?;
    for row in rows {
        writer.write_record(csv_record(row))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush ranked CSV: {}", err.error()))
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn snapshot_exists(&self) -> Result<bool> {
        tokio::fs::try_exists(&self.paths.csv)
            .await
            .with_context(|| format!("failed to stat {}", self.paths.csv.display()))
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<PublishedSnapshot> {
        let mut files = Vec::new();

        let table = render_ranked_csv(&snapshot.items)?;
        write_atomic(&self.paths.csv, &table).await?;
        files.push(self.paths.csv.clone());

        if let Some(json_path) = &self.paths.json {
            write_json(json_path, snapshot).await?;
            files.push(json_path.clone());
        }

        // empty days stay out of history so they never dilute presence
        if let Some(history_dir) = self.paths.history_dir.as_ref().filter(|_| !snapshot.items.is_empty()) {
            let dated = history_dir.join(format!("{}.json", snapshot.date.format("%Y-%m-%d")));
            write_json(&dated, snapshot).await?;
            files.push(dated);
        }

        info!(rows = snapshot.count, files = files.len(), "snapshot published");
        Ok(PublishedSnapshot {
            rows: snapshot.count,
            files,
        })
    }

    async fn write_diagnostics(&self, diagnostics: &Diagnostics) -> Result<PathBuf> {
        let dir = &self.paths.diagnostics_dir;
        write_json(&dir.join("candidates.json"), &diagnostics.candidates).await?;
        write_json(&dir.join("entities.json"), &diagnostics.entities).await?;
        write_json(&dir.join("rejections.json"), &diagnostics.rejections).await?;
        write_json(&dir.join("rows.json"), &diagnostics.rows).await?;

        info!(
            dir = %dir.display(),
            candidates = diagnostics.candidates.len(),
            rejections = diagnostics.rejections.len(),
            rows = diagnostics.rows.len(),
            "diagnostics written"
        );
        Ok(dir.clone())
    }

    async fn append_discovered(&self, ids: &[CandidateId]) -> Result<usize> {
        let Some(cache) = &self.paths.discovered_cache else {
            return Ok(0);
        };

        let existing = match tokio::fs::read_to_string(cache).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", cache.display()));
            }
        };

        let mut known: HashSet<CandidateId> = parse_id_lines(&existing).into_iter().collect();
        let fresh: Vec<&CandidateId> = ids.iter().filter(|id| known.insert((*id).clone())).collect();
        if fresh.is_empty() {
            debug!(cache = %cache.display(), "no new ids for discovered cache");
            return Ok(0);
        }

        let mut contents = existing;
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        for id in &fresh {
            contents.push_str(id.as_str());
            contents.push('\n');
        }
        write_atomic(cache, contents.as_bytes()).await?;

        info!(appended = fresh.len(), cache = %cache.display(), "discovered cache updated");
        Ok(fresh.len())
    }
}

/// Derives the compact `rank,channel_id,channel_name` list from a ranked CSV.
///
/// Keeps the first `limit` rows in file order. Columns missing from the
/// source are written empty.
///
/// # Errors
/// Fails when the source cannot be read or the output cannot be written.
pub async fn export_channel_list(ranked_csv: &Path, out: &Path, limit: usize) -> Result<usize> {
    let contents = tokio::fs::read_to_string(ranked_csv)
        .await
        .with_context(|| format!("failed to read {}", ranked_csv.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(contents.as_bytes());
    let headers = reader
        .headers()
        .with_context(|| format!("{} has no header row", ranked_csv.display()))?
        .clone();
    let columns: Vec<Option<usize>> = CHANNEL_LIST_HEADER
        .iter()
        .map(|name| headers.iter().position(|header| header.trim() == *name))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CHANNEL_LIST_HEADER)?;

    let mut written = 0_usize;
    for record in reader.records().take(limit) {
        let record = record.with_context(|| format!("malformed row in {}", ranked_csv.display()))?;
        let fields: Vec<&str> = columns
            .iter()
            .map(|column| column.and_then(|index| record.get(index)).unwrap_or(""))
            .collect();
        writer.write_record(&fields)?;
        written += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush channel list: {}", err.error()))?;
    write_atomic(out, &bytes).await?;

    info!(rows = written, out = %out.display(), "channel list written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    use crate::model::{Candidate, Classification, FeatureVector, SourceTag};
    use crate::pipeline::filter::Rejection;
    use crate::store::RejectionRecord;

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 23, 5, 0, 0).unwrap()
    }

    fn row(rank: u32, id: &str) -> ScoredRow {
        ScoredRow {
            rank,
            channel_id: CandidateId::new(id),
            channel_url: format!("https://www.youtube.com/channel/{id}"),
            channel_name: format!("{id}, the show"),
            channel_description: "Weekly conversations".into(),
            subscribers: 1200,
            video_count: 80,
            views_total: 90_000,
            country: "KE".into(),
            classification: Classification::Podcast,
            latest_video_id: "vid1".into(),
            latest_video_title: "Episode 1".into(),
            latest_video_thumbnail: String::new(),
            latest_video_published_at: Some(Utc.with_ymd_and_hms(2025, 9, 20, 10, 0, 0).unwrap()),
            latest_video_duration_sec: 1800,
            raw_features: FeatureVector::default(),
            normalized_features: FeatureVector::default(),
            score: 0.5,
            discovered_via: SourceTag::Seed,
            generated_at_utc: generated_at(),
        }
    }

    fn store(dir: &TempDir) -> FsSnapshotStore {
        FsSnapshotStore::new(SnapshotPaths {
            csv: dir.path().join("top500_ranked.csv"),
            json: Some(dir.path().join("public/data/top500.json")),
            history_dir: Some(dir.path().join("public/data/history")),
            diagnostics_dir: dir.path().join("data/diagnostics"),
            discovered_cache: Some(dir.path().join("data/discovered_channel_ids.txt")),
        })
    }

    #[tokio::test]
    async fn zero_row_snapshot_writes_header_only() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);
        assert!(!store.snapshot_exists().await.expect("stat"));

        let published = store
            .publish(&Snapshot::empty(generated_at()))
            .await
            .expect("publish");
        assert_eq!(published.rows, 0);
        assert!(store.snapshot_exists().await.expect("stat"));

        let csv = tokio::fs::read_to_string(dir.path().join("top500_ranked.csv"))
            .await
            .expect("csv");
        assert_eq!(csv, format!("{}\n", RANKED_HEADER.join(",")));

        let json: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(dir.path().join("public/data/top500.json"))
                .await
                .expect("json"),
        )
        .expect("valid json");
        assert_eq!(json["count"], 0);
        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["date"], "2025-09-23");

        assert!(
            !dir.path()
                .join("public/data/history/2025-09-23.json")
                .exists()
        );
    }

    #[tokio::test]
    async fn publish_writes_table_snapshot_and_history() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);
        let snapshot = Snapshot::new(generated_at(), vec![row(1, "UC_a"), row(2, "UC_b")]);

        let published = store.publish(&snapshot).await.expect("publish");
        assert_eq!(published.files.len(), 3);

        let csv = tokio::fs::read_to_string(dir.path().join("top500_ranked.csv"))
            .await
            .expect("csv");
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "UC_a");
        assert_eq!(&records[0][3], "UC_a, the show");
        assert_eq!(&records[0][13], "2025-09-20T10:00:00Z");
        assert_eq!(&records[1][0], "2");

        let history = tokio::fs::read_to_string(dir.path().join("public/data/history/2025-09-23.json"))
            .await
            .expect("history");
        let parsed: crate::model::HistorySnapshot = serde_json::from_str(&history).expect("history parses");
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[1].rank, Some(2));
        assert!(history.contains("\"normalized_features\""));
    }

    #[tokio::test]
    async fn diagnostics_leave_published_output_alone() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);
        store
            .publish(&Snapshot::new(generated_at(), vec![row(1, "UC_prev")]))
            .await
            .expect("publish");
        let before = tokio::fs::read(dir.path().join("top500_ranked.csv"))
            .await
            .expect("csv");

        let diagnostics = Diagnostics {
            generated_at_utc: generated_at(),
            min_rows: 10,
            candidates: vec![Candidate {
                id: CandidateId::new("UC_x"),
                source: SourceTag::Discovered,
            }],
            entities: Vec::new(),
            rejections: vec![RejectionRecord {
                channel_id: CandidateId::new("UC_x"),
                stage: Rejection::BelowFloor.stage(),
                detail: Rejection::BelowFloor,
            }],
            rows: vec![row(1, "UC_y")],
        };
        let written = store.write_diagnostics(&diagnostics).await.expect("diagnostics");

        for name in ["candidates.json", "entities.json", "rejections.json", "rows.json"] {
            assert!(written.join(name).exists(), "{name} missing");
        }
        let rejections = tokio::fs::read_to_string(written.join("rejections.json"))
            .await
            .expect("rejections");
        assert!(rejections.contains("\"stage\": \"floor\""));

        let after = tokio::fs::read(dir.path().join("top500_ranked.csv"))
            .await
            .expect("csv");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn discovered_cache_appends_only_new_ids() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);
        let cache = dir.path().join("data/discovered_channel_ids.txt");
        tokio::fs::create_dir_all(cache.parent().expect("parent"))
            .await
            .expect("mkdir");
        tokio::fs::write(&cache, "UC_a").await.expect("seed cache");

        let ids = vec![
            CandidateId::new("UC_a"),
            CandidateId::new("UC_b"),
            CandidateId::new("UC_b"),
        ];
        assert_eq!(store.append_discovered(&ids).await.expect("append"), 1);
        assert_eq!(store.append_discovered(&ids).await.expect("append"), 0);

        let contents = tokio::fs::read_to_string(&cache).await.expect("cache");
        assert_eq!(contents, "UC_a\nUC_b\n");
    }

    #[tokio::test]
    async fn channel_list_keeps_three_columns_and_limit() {
        let dir = TempDir::new().expect("temp dir");
        let ranked = dir.path().join("ranked.csv");
        tokio::fs::write(
            &ranked,
            "rank,channel_id,subscribers\n1,UC_a,10\n2,UC_b,5\n3,UC_c,1\n",
        )
        .await
        .expect("ranked");
        let out = dir.path().join("channels.csv");

        let written = export_channel_list(&ranked, &out, 2).await.expect("export");
        assert_eq!(written, 2);
        let contents = tokio::fs::read_to_string(&out).await.expect("channels");
        assert_eq!(contents, "rank,channel_id,channel_name\n1,UC_a,\n2,UC_b,\n");
    }

    #[tokio::test]
    async fn channel_list_requires_source() {
        let dir = TempDir::new().expect("temp dir");
        let result = export_channel_list(
            &dir.path().join("missing.csv"),
            &dir.path().join("channels.csv"),
            500,
        )
        .await;
        assert!(result.is_err());
    }
}
