//! Metadata resolution against the content platform.
//!
//! Publisher lookups are batched and a failed batch is skipped, never fatal.
//! Upload inspection is a self-contained unit of work per publisher so it
//! can later run on a bounded worker pool without touching the filter and
//! scoring stages.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clients::ContentPlatform;
use crate::model::{CandidateId, EntityRecord, VideoProbe};

/// Publisher records for the resolvable subset of the requested ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherFetch {
    /// In request order; ids the platform did not return are absent.
    pub records: Vec<EntityRecord>,
    pub failed_batches: usize,
    pub unresolved: usize,
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Resolves `ids` in batches of at most `batch_size`.
pub async fn fetch_publishers(
    platform: &dyn ContentPlatform,
    ids: &[CandidateId],
    batch_size: usize,
    pause_between: Duration,
) -> PublisherFetch {
    let batch_size = batch_size.max(1);
    let mut by_id: HashMap<CandidateId, EntityRecord> = HashMap::with_capacity(ids.len());
    let mut failed_batches = 0;

    for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
        if batch_index > 0 {
            pause(pause_between).await;
        }
        match platform.fetch_publishers(batch).await {
            Ok(records) => {
                debug!(batch = batch_index, returned = records.len(), "publisher batch fetched");
                let requested: HashSet<&CandidateId> = batch.iter().collect();
                for record in records {
                    if requested.contains(&record.id) {
                        by_id.entry(record.id.clone()).or_insert(record);
                    }
                }
            }
            Err(err) => {
                failed_batches += 1;
                warn!(
                    batch = batch_index,
                    size = batch.len(),
                    error = %err,
                    "publisher batch failed, skipping"
                );
            }
        }
    }

    let mut records = Vec::with_capacity(by_id.len());
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(record) = by_id.remove(id) {
            records.push(record);
        }
    }
    let unresolved = seen.len() - records.len();
    if unresolved > 0 {
        debug!(unresolved, "some candidate ids did not resolve");
    }

    PublisherFetch {
        records,
        failed_batches,
        unresolved,
    }
}

/// Recent uploads of one publisher, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadFeed {
    pub videos: Vec<VideoProbe>,
    pub failed_pages: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    pub max_items: usize,
    pub video_batch_size: usize,
    pub pause: Duration,
}

pub struct UploadInspector<'a> {
    platform: &'a dyn ContentPlatform,
    settings: UploadSettings,
}

impl<'a> UploadInspector<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn ContentPlatform, settings: UploadSettings) -> Self {
        Self { platform, settings }
    }

    /// Collects up to `max_items` uploads of `record` and resolves them.
    ///
    /// Page and batch failures shrink the result instead of failing it.
    pub async fn inspect(&self, record: &EntityRecord) -> UploadFeed {
        let mut feed = UploadFeed::default();
        let Some(pointer) = record.uploads_feed.as_deref() else {
            return feed;
        };
        if self.settings.max_items == 0 {
            return feed;
        }

        let video_ids = self.collect_video_ids(record, pointer, &mut feed).await;
        if video_ids.is_empty() {
            return feed;
        }

        let batch_size = self.settings.video_batch_size.max(1);
        let mut videos = Vec::with_capacity(video_ids.len());
        for batch in video_ids.chunks(batch_size) {
            pause(self.settings.pause).await;
            match self.platform.fetch_videos(batch).await {
                Ok(found) => videos.extend(found),
                Err(err) => {
                    feed.failed_batches += 1;
                    warn!(
                        channel_id = %record.id,
                        size = batch.len(),
                        error = %err,
                        "video batch failed, skipping"
                    );
                }
            }
        }

        feed.videos = newest_first(videos);
        feed
    }

    async fn collect_video_ids(
        &self,
        record: &EntityRecord,
        pointer: &str,
        feed: &mut UploadFeed,
    ) -> Vec<String> {
        let mut collected: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;

        while collected.len() < self.settings.max_items {
            pause(self.settings.pause).await;
            let page = match self
                .platform
                .fetch_upload_feed_page(pointer, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    feed.failed_pages += 1;
                    warn!(
                        channel_id = %record.id,
                        collected = collected.len(),
                        error = %err,
                        "upload feed page failed, keeping collected items"
                    );
                    break;
                }
            };

            for video_id in page.video_ids {
                if collected.len() >= self.settings.max_items {
                    break;
                }
                if seen.insert(video_id.clone()) {
                    collected.push(video_id);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        collected
    }
}

/// Sorts by publish time, newest first. Undated videos go last in feed order.
#[must_use]
pub fn newest_first(mut videos: Vec<VideoProbe>) -> Vec<VideoProbe> {
    videos.sort_by_key(|video| Reverse(video.published_at));
    let mut seen = HashSet::new();
    videos.retain(|video| seen.insert(video.id.clone()));
    videos
}
