//! Trailing-window rollups over dated history snapshots.
//!
//! Each rollup is a single fold over the snapshots in its window. Nothing is
//! inferred from file order: metadata follows `generated_at_utc` and the
//! latest-video fields follow the embedded publish timestamps.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{info, warn};

use super::score::round_score;
use crate::model::{
    CandidateId, Classification, DatedSnapshot, HistoryItem, Rollup, RollupEntry,
};
use crate::store::HistoryStore;

pub const AVG_RANK_WEIGHT: f64 = 1.0;
pub const BEST_RANK_WEIGHT: f64 = 1.2;
pub const PRESENCE_WEIGHT: f64 = 0.8;

/// Inclusive `[today - (days - 1), today]`.
#[must_use]
pub fn window_bounds(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let back = u64::from(days.saturating_sub(1));
    let start = today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
    (start, today)
}

/// Snapshots whose date falls inside the window, ordered by date.
#[must_use]
pub fn select_window(snapshots: &[DatedSnapshot], today: NaiveDate, days: u32) -> Vec<&DatedSnapshot> {
    let (start, end) = window_bounds(today, days);
    let mut selected: Vec<&DatedSnapshot> = snapshots
        .iter()
        .filter(|dated| dated.date >= start && dated.date <= end)
        .collect();
    selected.sort_by_key(|dated| dated.date);
    selected
}

#[must_use]
pub fn range_tag(days: u32) -> String {
    format!("{days}d")
}

/// Running aggregate for one publisher.
struct Slot {
    ranks: Vec<u32>,
    meta: HistoryItem,
    meta_time: DateTime<Utc>,
    video: HistoryItem,
}

fn snapshot_time(dated: &DatedSnapshot) -> DateTime<Utc> {
    dated
        .snapshot
        .generated_at_utc
        .unwrap_or_else(|| dated.date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn has_newer_video(candidate: &HistoryItem, current: &HistoryItem) -> bool {
    if candidate.latest_video_id.is_empty() {
        return false;
    }
    current.latest_video_id.is_empty()
        || candidate.latest_video_published_at > current.latest_video_published_at
}

/// Folds `snapshots` into a ranked rollup capped at `cap` entries.
#[must_use]
pub fn build_rollup(
    snapshots: &[&DatedSnapshot],
    window_days: u32,
    cap: usize,
    generated_at: DateTime<Utc>,
) -> Rollup {
    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, Slot> = HashMap::new();
    let mut skipped_rows = 0_usize;

    for dated in snapshots {
        let taken_at = snapshot_time(dated);
        let mut seen_here: HashSet<&str> = HashSet::new();

        for item in &dated.snapshot.items {
            let (Some(id), Some(rank)) = (item.channel_id.as_deref(), item.rank) else {
                skipped_rows += 1;
                continue;
            };
            if id.trim().is_empty() || !seen_here.insert(id) {
                continue;
            }

            match slots.get_mut(id) {
                Some(slot) => {
                    slot.ranks.push(rank);
                    if taken_at > slot.meta_time {
                        slot.meta = item.clone();
                        slot.meta_time = taken_at;
                    }
                    if has_newer_video(item, &slot.video) {
                        slot.video = item.clone();
                    }
                }
                None => {
                    order.push(id.to_string());
                    slots.insert(
                        id.to_string(),
                        Slot {
                            ranks: vec![rank],
                            meta: item.clone(),
                            meta_time: taken_at,
                            video: item.clone(),
                        },
                    );
                }
            }
        }
    }

    if skipped_rows > 0 {
        warn!(skipped_rows, "skipped history rows without id or rank");
    }

    let considered = snapshots.len();
    let mut entries: Vec<RollupEntry> = order
        .into_iter()
        .filter_map(|id| slots.remove(&id).map(|slot| (id, slot)))
        .map(|(id, slot)| into_entry(id, slot, considered))
        .collect();

    entries.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.channel_id.cmp(&b.channel_id))
    });
    entries.truncate(cap);
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = u32::try_from(position + 1).unwrap_or(u32::MAX);
    }

    Rollup {
        generated_at_utc: generated_at,
        range: range_tag(window_days),
        window_days,
        snapshots_considered: considered,
        items: entries,
    }
}

#[allow(clippy::cast_precision_loss)]
fn into_entry(id: String, slot: Slot, considered: usize) -> RollupEntry {
    let appearances = slot.ranks.len();
    let avg_rank = slot.ranks.iter().map(|rank| f64::from(*rank)).sum::<f64>() / appearances as f64;
    let best_rank = slot.ranks.iter().copied().min().unwrap_or(u32::MAX);
    let presence = if considered == 0 {
        0.0
    } else {
        (appearances as f64 / considered as f64).min(1.0)
    };
    let score = AVG_RANK_WEIGHT / avg_rank
        + BEST_RANK_WEIGHT / f64::from(best_rank)
        + PRESENCE_WEIGHT * presence;

    let meta = slot.meta;
    let video = slot.video;
    RollupEntry {
        rank: 0,
        channel_id: CandidateId::new(id),
        channel_name: meta.channel_name,
        channel_url: meta.channel_url,
        subscribers: meta.subscribers,
        video_count: meta.video_count,
        country: meta.country,
        classification: meta.classification.unwrap_or(Classification::Other),
        latest_video_id: video.latest_video_id,
        latest_video_title: video.latest_video_title,
        latest_video_thumbnail: video.latest_video_thumbnail,
        latest_video_published_at: video.latest_video_published_at,
        ranks: slot.ranks,
        avg_rank: round_score(avg_rank),
        best_rank,
        appearances,
        presence: round_score(presence),
        score: round_score(score),
    }
}

/// Outcome of one rollup window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupReport {
    pub range: String,
    pub snapshots_considered: usize,
    pub entries: usize,
    pub path: PathBuf,
}

/// Builds and writes one rollup per configured window.
pub struct RollupJob {
    store: Arc<dyn HistoryStore>,
    windows: Vec<u32>,
    cap: usize,
}

impl RollupJob {
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>, windows: Vec<u32>, cap: usize) -> Self {
        Self {
            store,
            windows,
            cap,
        }
    }

    /// # Errors
    /// Fails when history cannot be listed or a rollup cannot be written.
    /// Individual unreadable snapshots are skipped by the store.
    pub async fn run(&self, today: NaiveDate, generated_at: DateTime<Utc>) -> Result<Vec<RollupReport>> {
        let mut reports = Vec::with_capacity(self.windows.len());

        for &days in &self.windows {
            let (start, end) = window_bounds(today, days);
            let loaded = self.store.load_history(start, end).await?;
            let in_window = select_window(&loaded, today, days);
            let rollup = build_rollup(&in_window, days, self.cap, generated_at);
            let path = self.store.write_rollup(&rollup).await?;

            info!(
                range = %rollup.range,
                snapshots = rollup.snapshots_considered,
                entries = rollup.items.len(),
                path = %path.display(),
                "rollup written"
            );
            reports.push(RollupReport {
                range: rollup.range,
                snapshots_considered: rollup.snapshots_considered,
                entries: rollup.items.len(),
                path,
            });
        }

        Ok(reports)
    }
}
