//! The daily ranking run: acquire candidates, resolve, filter, score, rank,
//! publish.
//!
//! Stages run strictly in order on one control flow. Local stages absorb and
//! degrade; only configuration errors and under-yield surface as [`RunError`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clients::ContentPlatform;
use crate::config::{Config, ConfigError};
use crate::model::{Classification, EntityRecord, Snapshot, SourceTag};
use crate::store::{Diagnostics, RejectionRecord, SnapshotStore};

pub mod classify;
pub mod discover;
pub mod features;
pub mod fetch;
pub mod filter;
pub mod rank;
pub mod rollup;
pub mod score;
pub mod sources;

use classify::{KeywordBlocker, RegionHints};
use discover::{DiscoveryConfig, DiscoveryEngine, DiscoveryOutcome};
use features::{VideoGates, pick_latest_video, raw_features, summarize_uploads};
use fetch::{UploadInspector, UploadSettings, fetch_publishers};
use filter::{FilterPolicy, InclusionFilter, Rejection};
use rank::{RankMode, ScoredEntity, rank_entities};
use sources::{Blocklist, CandidatePool, load_existing_ids, read_id_list, read_keyword_list};

/// Local inputs of a build run. `None` means "no such source".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePaths {
    pub seeds: Option<PathBuf>,
    pub blocklist: Option<PathBuf>,
    pub blocked_keywords: Option<PathBuf>,
    pub discovered_cache: Option<PathBuf>,
    /// Previously published ranked table.
    pub existing: Option<PathBuf>,
}

/// Tunables of one build run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub discover: bool,
    pub discovery: DiscoveryConfig,
    pub max_candidates: usize,
    pub publisher_batch_size: usize,
    pub request_pause: Duration,
    pub uploads: UploadSettings,
    pub gates: VideoGates,
    pub target_region: String,
    pub region_hints: Vec<String>,
    pub accepted_labels: Vec<Classification>,
    pub interview_label: Classification,
    pub min_subscribers: u64,
    pub min_total_views: u64,
    pub floors_bypass_for_seeds: bool,
    pub keep_without_video: bool,
    pub rank_mode: RankMode,
    pub output_cap: usize,
    pub min_rows: usize,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            discover: true,
            discovery: DiscoveryConfig {
                queries: config.discovery_queries().to_vec(),
                max_ids: config.discovery_max_ids(),
                max_pages_per_query: config.discovery_max_pages_per_query(),
                pause: config.request_pause(),
            },
            max_candidates: config.max_candidates(),
            publisher_batch_size: config.publisher_batch_size(),
            request_pause: config.request_pause(),
            uploads: UploadSettings {
                max_items: config.upload_feed_max_items(),
                video_batch_size: config.video_batch_size(),
                pause: config.request_pause(),
            },
            gates: VideoGates {
                min_duration_secs: config.min_duration_sec(),
                max_age_days: config.max_video_age_days(),
                min_views: config.min_video_views(),
            },
            target_region: config.target_region().to_string(),
            region_hints: config.region_hints().to_vec(),
            accepted_labels: config.accepted_labels().to_vec(),
            interview_label: config.interview_label(),
            min_subscribers: config.min_subscribers(),
            min_total_views: config.min_total_views(),
            floors_bypass_for_seeds: config.floors_bypass_for_seeds(),
            keep_without_video: config.keep_without_video(),
            rank_mode: config.rank_mode(),
            output_cap: config.output_cap(),
            min_rows: config.min_rows(),
        }
    }
}

/// Summary of a finished build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub candidates: usize,
    pub discovered: usize,
    pub fetched: usize,
    pub survivors: usize,
    pub rows: usize,
    /// Rejection counts keyed by predicate stage.
    pub rejections: BTreeMap<&'static str, usize>,
    pub quota_stopped: bool,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("run produced {rows} rows, below the floor of {floor}; previous output left in place")]
    UnderYield { rows: usize, floor: usize },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunError {
    /// Process exit status for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) | RunError::Other(_) => 1,
            RunError::UnderYield { .. } => 2,
        }
    }
}

pub struct RankingPipeline {
    settings: PipelineSettings,
    sources: SourcePaths,
    platform: Arc<dyn ContentPlatform>,
    store: Arc<dyn SnapshotStore>,
}

pub struct PipelineBuilder {
    settings: PipelineSettings,
    sources: SourcePaths,
    platform: Option<Arc<dyn ContentPlatform>>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            sources: SourcePaths::default(),
            platform: None,
            store: None,
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: SourcePaths) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn ContentPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// # Errors
    /// Fails when the platform or the store was not provided.
    pub fn build(self) -> anyhow::Result<RankingPipeline> {
        Ok(RankingPipeline {
            settings: self.settings,
            sources: self.sources,
            platform: self.platform.context("ranking pipeline needs a content platform")?,
            store: self.store.context("ranking pipeline needs a snapshot store")?,
        })
    }
}

/// Survivors and rejections of the filter and feature stages.
#[derive(Default)]
struct Screening {
    survivors: Vec<ScoredEntity>,
    rejections: Vec<RejectionRecord>,
}

impl Screening {
    fn reject(&mut self, entity: &EntityRecord, rejection: Rejection) {
        debug!(channel_id = %entity.id, stage = rejection.stage(), "publisher rejected");
        self.rejections.push(RejectionRecord {
            channel_id: entity.id.clone(),
            stage: rejection.stage(),
            detail: rejection,
        });
    }
}

impl RankingPipeline {
    #[must_use]
    pub fn builder(settings: PipelineSettings) -> PipelineBuilder {
        PipelineBuilder::new(settings)
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one full build and publishes its snapshot.
    ///
    /// # Errors
    /// [`RunError::UnderYield`] when `0 < rows < min_rows` (diagnostics are
    /// written and the published snapshot is left untouched), and
    /// [`RunError::Other`] for unreadable inputs or failed writes.
    pub async fn run(&self, generated_at: DateTime<Utc>) -> Result<RunReport, RunError> {
        let settings = &self.settings;
        info!(
            discover = settings.discover,
            rank_mode = %settings.rank_mode,
            output_cap = settings.output_cap,
            "ranking run started"
        );

        let blocklist = Blocklist::load(self.sources.blocklist.as_deref()).await?;
        let keywords = read_keyword_list(self.sources.blocked_keywords.as_deref()).await?;
        let blocked_keywords = KeywordBlocker::new(&keywords)?;

        let (pool, discovery) = self.acquire(&blocklist).await?;
        let mut report = RunReport {
            candidates: pool.len(),
            discovered: pool
                .candidates()
                .iter()
                .filter(|candidate| candidate.source == SourceTag::Discovered)
                .count(),
            quota_stopped: discovery.quota_stopped,
            ..RunReport::default()
        };

        let fetched = fetch_publishers(
            self.platform.as_ref(),
            &pool.ids(),
            settings.publisher_batch_size,
            settings.request_pause,
        )
        .await;
        if fetched.failed_batches > 0 {
            warn!(
                failed_batches = fetched.failed_batches,
                resolved = fetched.records.len(),
                "some publisher batches were skipped"
            );
        }
        report.fetched = fetched.records.len();

        let filter = InclusionFilter::new(FilterPolicy {
            blocklist,
            target_region: settings.target_region.clone(),
            region_hints: RegionHints::new(&settings.region_hints)?,
            accepted_labels: settings.accepted_labels.clone(),
            interview_label: settings.interview_label,
            blocked_keywords: blocked_keywords.clone(),
            min_subscribers: settings.min_subscribers,
            min_total_views: settings.min_total_views,
            floors_bypass_for_seeds: settings.floors_bypass_for_seeds,
        });
        let screening = self
            .screen(&pool, &fetched.records, &filter, &blocked_keywords, generated_at)
            .await;
        report.survivors = screening.survivors.len();
        for record in &screening.rejections {
            *report.rejections.entry(record.stage).or_default() += 1;
        }

        let rows = rank_entities(
            screening.survivors,
            settings.rank_mode,
            settings.output_cap,
            generated_at,
        );
        report.rows = rows.len();

        if settings.min_rows > 0 && !rows.is_empty() && rows.len() < settings.min_rows {
            warn!(
                rows = rows.len(),
                floor = settings.min_rows,
                "run under-yielded, writing diagnostics instead of publishing"
            );
            self.store
                .write_diagnostics(&Diagnostics {
                    generated_at_utc: generated_at,
                    min_rows: settings.min_rows,
                    candidates: pool.candidates().to_vec(),
                    entities: fetched.records,
                    rejections: screening.rejections,
                    rows,
                })
                .await?;
            return Err(RunError::UnderYield {
                rows: report.rows,
                floor: settings.min_rows,
            });
        }

        let snapshot = Snapshot::new(generated_at, rows);
        self.store.publish(&snapshot).await?;

        info!(
            candidates = report.candidates,
            discovered = report.discovered,
            fetched = report.fetched,
            survivors = report.survivors,
            rows = report.rows,
            quota_stopped = report.quota_stopped,
            rejections = ?report.rejections,
            "ranking run finished"
        );
        Ok(report)
    }

    /// Builds the candidate pool: seed, cached, existing, then discovered ids.
    async fn acquire(&self, blocklist: &Blocklist) -> anyhow::Result<(CandidatePool, DiscoveryOutcome)> {
        let seeds = read_id_list(self.sources.seeds.as_deref()).await?;
        let cached = read_id_list(self.sources.discovered_cache.as_deref()).await?;
        let existing = load_existing_ids(self.sources.existing.as_deref()).await?;
        debug!(
            seeds = seeds.len(),
            cached = cached.len(),
            existing = existing.len(),
            blocklisted = blocklist.len(),
            "local sources loaded"
        );

        let mut pool = CandidatePool::new()
            .absorb(seeds, SourceTag::Seed)
            .absorb(cached, SourceTag::Cached)
            .absorb(existing, SourceTag::Existing);

        let mut discovery = DiscoveryOutcome::default();
        if self.settings.discover {
            discovery = DiscoveryEngine::new(self.platform.as_ref(), &self.settings.discovery)
                .run()
                .await;
            if !discovery.ids.is_empty() {
                if let Err(err) = self.store.append_discovered(&discovery.ids).await {
                    warn!(error = ?err, "failed to update discovered-id cache, continuing");
                }
            }
            pool = pool.absorb(discovery.ids.iter().cloned(), SourceTag::Discovered);
        }

        let before = pool.len();
        pool.retain(|candidate| !blocklist.contains(&candidate.id));
        if pool.len() < before {
            debug!(removed = before - pool.len(), "blocklisted ids removed before fetch");
        }
        if pool.len() > self.settings.max_candidates {
            warn!(
                pool = pool.len(),
                max_candidates = self.settings.max_candidates,
                "candidate pool truncated"
            );
            pool.truncate(self.settings.max_candidates);
        }

        Ok((pool, discovery))
    }

    /// Filters each resolved publisher, then picks its representative video
    /// and extracts raw features.
    async fn screen(
        &self,
        pool: &CandidatePool,
        records: &[EntityRecord],
        filter: &InclusionFilter,
        keywords: &KeywordBlocker,
        as_of: DateTime<Utc>,
    ) -> Screening {
        let inspector = UploadInspector::new(self.platform.as_ref(), self.settings.uploads);
        let mut screening = Screening::default();

        for entity in records {
            let source = pool.source_of(&entity.id).unwrap_or_default();
            let label = match filter.evaluate(entity, source == SourceTag::Seed) {
                Ok(label) => label,
                Err(rejection) => {
                    screening.reject(entity, rejection);
                    continue;
                }
            };

            let feed = inspector.inspect(entity).await;
            let latest = pick_latest_video(&feed.videos, &self.settings.gates, keywords, as_of).cloned();
            if latest.is_none() && !self.settings.keep_without_video {
                screening.reject(entity, Rejection::NoAcceptableVideo);
                continue;
            }

            let activity = summarize_uploads(&feed.videos, as_of);
            screening.survivors.push(ScoredEntity {
                raw: raw_features(entity, &activity),
                entity: entity.clone(),
                source,
                label,
                latest,
            });
        }

        screening
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::clients::{FeedPage, PlatformError, SearchPage};
    use crate::model::{CandidateId, VideoProbe};
    use crate::store::PublishedSnapshot;

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 23, 5, 0, 0).unwrap()
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            discover: true,
            discovery: DiscoveryConfig {
                queries: vec!["kenyan podcast".into()],
                max_ids: 100,
                max_pages_per_query: 2,
                pause: Duration::ZERO,
            },
            max_candidates: 1500,
            publisher_batch_size: 50,
            request_pause: Duration::ZERO,
            uploads: UploadSettings {
                max_items: 30,
                video_batch_size: 50,
                pause: Duration::ZERO,
            },
            gates: VideoGates {
                min_duration_secs: 300,
                max_age_days: 365,
                min_views: 0,
            },
            target_region: "KE".into(),
            region_hints: vec!["kenya".into(), "nairobi".into()],
            accepted_labels: vec![Classification::Podcast, Classification::Interview],
            interview_label: Classification::Interview,
            min_subscribers: 0,
            min_total_views: 0,
            floors_bypass_for_seeds: true,
            keep_without_video: true,
            rank_mode: RankMode::Composite,
            output_cap: 500,
            min_rows: 0,
        }
    }

    fn publisher(id: &str, name: &str, subscribers: u64) -> EntityRecord {
        EntityRecord {
            id: CandidateId::new(id),
            url: format!("https://www.youtube.com/channel/{id}"),
            name: name.to_string(),
            description: String::new(),
            region: "KE".into(),
            subscribers,
            views: 1000,
            videos: 10,
            uploads_feed: Some(format!("UU{id}")),
        }
    }

    struct FakePlatform {
        search: Vec<CandidateId>,
        publishers: HashMap<CandidateId, EntityRecord>,
        feeds: HashMap<String, Vec<VideoProbe>>,
    }

    #[async_trait]
    impl ContentPlatform for FakePlatform {
        async fn search_publishers(
            &self,
            _query: &str,
            _page_token: Option<&str>,
        ) -> Result<SearchPage, PlatformError> {
            Ok(SearchPage {
                ids: self.search.clone(),
                next_page_token: None,
            })
        }

        async fn fetch_publishers(&self, ids: &[CandidateId]) -> Result<Vec<EntityRecord>, PlatformError> {
            Ok(ids.iter().filter_map(|id| self.publishers.get(id).cloned()).collect())
        }

        async fn fetch_upload_feed_page(
            &self,
            feed: &str,
            _page_token: Option<&str>,
        ) -> Result<FeedPage, PlatformError> {
            Ok(FeedPage {
                video_ids: self
                    .feeds
                    .get(feed)
                    .map(|videos| videos.iter().map(|video| video.id.clone()).collect())
                    .unwrap_or_default(),
                next_page_token: None,
            })
        }

        async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<VideoProbe>, PlatformError> {
            Ok(self
                .feeds
                .values()
                .flatten()
                .filter(|video| ids.contains(&video.id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        published: Mutex<Vec<Snapshot>>,
        diagnostics: Mutex<Vec<Diagnostics>>,
        appended: Mutex<Vec<CandidateId>>,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn snapshot_exists(&self) -> anyhow::Result<bool> {
            Ok(!self.published.lock().unwrap().is_empty())
        }

        async fn publish(&self, snapshot: &Snapshot) -> anyhow::Result<PublishedSnapshot> {
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(PublishedSnapshot {
                rows: snapshot.count,
                files: Vec::new(),
            })
        }

        async fn write_diagnostics(&self, diagnostics: &Diagnostics) -> anyhow::Result<PathBuf> {
            self.diagnostics.lock().unwrap().push(diagnostics.clone());
            Ok(PathBuf::from("diagnostics"))
        }

        async fn append_discovered(&self, ids: &[CandidateId]) -> anyhow::Result<usize> {
            self.appended.lock().unwrap().extend_from_slice(ids);
            Ok(ids.len())
        }
    }

    fn platform() -> FakePlatform {
        let publishers = [
            publisher("UC_pod", "Nairobi Podcast", 5000),
            publisher("UC_talk", "Late Night Talk Show", 800),
            publisher("UC_vlog", "Daily Vlogs", 90_000),
        ]
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();
        FakePlatform {
            search: vec![
                CandidateId::new("UC_pod"),
                CandidateId::new("UC_talk"),
                CandidateId::new("UC_vlog"),
            ],
            publishers,
            feeds: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn run_publishes_filtered_ranking() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = RankingPipeline::builder(settings())
            .with_platform(Arc::new(platform()))
            .with_store(Arc::clone(&store) as Arc<dyn SnapshotStore>)
            .build()
            .expect("pipeline");

        let report = pipeline.run(generated_at()).await.expect("run");

        assert_eq!(report.candidates, 3);
        assert_eq!(report.discovered, 3);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.rows, 2);
        assert_eq!(report.rejections.get("content_type"), Some(&1));

        let published = store.published.lock().unwrap();
        let ids: Vec<&str> = published[0]
            .items
            .iter()
            .map(|row| row.channel_id.as_str())
            .collect();
        assert_eq!(ids, vec!["UC_pod", "UC_talk"]);
        assert!(published[0].items.iter().all(|row| row.discovered_via == SourceTag::Discovered));
        assert_eq!(store.appended.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn under_yield_writes_diagnostics_only() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = RankingPipeline::builder(PipelineSettings {
            min_rows: 10,
            ..settings()
        })
        .with_platform(Arc::new(platform()))
        .with_store(Arc::clone(&store) as Arc<dyn SnapshotStore>)
        .build()
        .expect("pipeline");

        let err = pipeline.run(generated_at()).await.expect_err("under-yield");
        assert!(matches!(err, RunError::UnderYield { rows: 2, floor: 10 }));
        assert_eq!(err.exit_code(), 2);
        assert!(store.published.lock().unwrap().is_empty());

        let diagnostics = store.diagnostics.lock().unwrap();
        assert_eq!(diagnostics[0].candidates.len(), 3);
        assert_eq!(diagnostics[0].rejections[0].channel_id.as_str(), "UC_vlog");
        assert_eq!(diagnostics[0].rows.len(), 2);
    }

    #[tokio::test]
    async fn dropping_publishers_without_video_is_configurable() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = RankingPipeline::builder(PipelineSettings {
            keep_without_video: false,
            ..settings()
        })
        .with_platform(Arc::new(platform()))
        .with_store(Arc::clone(&store) as Arc<dyn SnapshotStore>)
        .build()
        .expect("pipeline");

        let report = pipeline.run(generated_at()).await.expect("run");
        assert_eq!(report.rows, 0);
        assert_eq!(report.rejections.get("no_video"), Some(&2));
        assert_eq!(store.published.lock().unwrap()[0].count, 0);
    }

    #[test]
    fn builder_requires_collaborators() {
        assert!(RankingPipeline::builder(settings()).build().is_err());
    }
}
