//! Final ordering, truncation and dense rank assignment.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::score::{composite, normalize_all};
use crate::model::{Classification, EntityRecord, FeatureVector, ScoredRow, SourceTag, VideoProbe};

/// How surviving publishers are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// Composite score first, then the count tie-breaks.
    #[default]
    Composite,
    /// Count tie-breaks only, subscribers first.
    Subscribers,
}

impl RankMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RankMode::Composite => "composite",
            RankMode::Subscribers => "subscribers",
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "composite" => Ok(RankMode::Composite),
            "subscribers" => Ok(RankMode::Subscribers),
            other => Err(format!("unknown rank mode: {other}")),
        }
    }
}

/// A surviving publisher with everything needed to build its output row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity {
    pub entity: EntityRecord,
    pub source: SourceTag,
    pub label: Classification,
    pub latest: Option<VideoProbe>,
    pub raw: FeatureVector,
}

struct Ranked {
    item: ScoredEntity,
    normalized: FeatureVector,
    score: f64,
}

fn by_counts(a: &EntityRecord, b: &EntityRecord) -> Ordering {
    b.subscribers
        .cmp(&a.subscribers)
        .then_with(|| b.views.cmp(&a.views))
        .then_with(|| b.videos.cmp(&a.videos))
}

/// Normalizes, scores, orders and ranks the whole survivor set at once.
///
/// The sort is stable, so equal keys keep insertion order. Ranks are a dense
/// `1..=K` with `K = min(survivors, cap)`.
#[must_use]
pub fn rank_entities(
    entities: Vec<ScoredEntity>,
    mode: RankMode,
    cap: usize,
    generated_at: DateTime<Utc>,
) -> Vec<ScoredRow> {
    let mut seen = HashSet::new();
    let entities: Vec<ScoredEntity> = entities
        .into_iter()
        .filter(|item| seen.insert(item.entity.id.clone()))
        .collect();

    let raw: Vec<FeatureVector> = entities.iter().map(|item| item.raw).collect();
    let normalized = normalize_all(&raw);

    let mut ranked: Vec<Ranked> = entities
        .into_iter()
        .zip(normalized)
        .map(|(item, normalized)| Ranked {
            score: composite(&normalized),
            item,
            normalized,
        })
        .collect();

    ranked.sort_by(|a, b| {
        let counts = by_counts(&a.item.entity, &b.item.entity);
        match mode {
            RankMode::Composite => b.score.total_cmp(&a.score).then(counts),
            RankMode::Subscribers => counts,
        }
    });
    ranked.truncate(cap);

    ranked
        .into_iter()
        .enumerate()
        .map(|(position, ranked)| into_row(position, ranked, generated_at))
        .collect()
}

fn into_row(position: usize, ranked: Ranked, generated_at: DateTime<Utc>) -> ScoredRow {
    let Ranked {
        item,
        normalized,
        score,
    } = ranked;
    let entity = item.entity;
    let latest = item.latest.unwrap_or_else(|| VideoProbe {
        id: String::new(),
        title: String::new(),
        description: String::new(),
        tags: Vec::new(),
        published_at: None,
        duration_secs: 0,
        views: 0,
        thumbnail: String::new(),
    });

    ScoredRow {
        rank: u32::try_from(position + 1).unwrap_or(u32::MAX),
        channel_id: entity.id,
        channel_url: entity.url,
        channel_name: entity.name,
        channel_description: entity.description,
        subscribers: entity.subscribers,
        video_count: entity.videos,
        views_total: entity.views,
        country: entity.region,
        classification: item.label,
        latest_video_id: latest.id,
        latest_video_title: latest.title,
        latest_video_thumbnail: latest.thumbnail,
        latest_video_published_at: latest.published_at,
        latest_video_duration_sec: latest.duration_secs,
        raw_features: item.raw,
        normalized_features: normalized,
        score,
        discovered_via: item.source,
        generated_at_utc: generated_at,
    }
}
