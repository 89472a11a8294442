//! Data shapes shared by the ranking pipeline, the snapshot store and the rollup.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Platform-assigned publisher identifier. Equality is exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Where a candidate id first entered the pool. Never affects scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    #[default]
    Seed,
    Cached,
    Discovered,
    Existing,
}

impl SourceTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Seed => "seed",
            SourceTag::Cached => "cached",
            SourceTag::Discovered => "discovered",
            SourceTag::Existing => "existing",
        }
    }
}

/// One candidate in the pool together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub source: SourceTag,
}

/// A publisher's metadata as resolved from the platform.
///
/// Counts are non-negative; anything missing or unparseable is stored as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: CandidateId,
    pub url: String,
    pub name: String,
    pub description: String,
    /// Declared region code, empty when the publisher did not declare one.
    pub region: String,
    pub subscribers: u64,
    pub views: u64,
    pub videos: u64,
    /// Pointer to the publisher's upload feed.
    pub uploads_feed: Option<String>,
}

impl EntityRecord {
    /// Name and description joined for pattern matching.
    #[must_use]
    pub fn text_blob(&self) -> String {
        format!("{} {}", self.name, self.description)
    }
}

/// One upload's metadata used for gating and feature extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProbe {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub views: u64,
    pub thumbnail: String,
}

impl VideoProbe {
    /// Title, description and tags joined for pattern matching.
    #[must_use]
    pub fn text_blob(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.tags.join(" "))
    }
}

/// Content-type label derived from a publisher's name and description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Podcast,
    Interview,
    #[default]
    Other,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Podcast => "podcast",
            Classification::Interview => "interview",
            Classification::Other => "other",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "podcast" => Ok(Classification::Podcast),
            "interview" => Ok(Classification::Interview),
            "other" => Ok(Classification::Other),
            other => Err(format!("unknown classification label: {other}")),
        }
    }
}

/// The five per-entity signals, raw or normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub subs: f64,
    pub views: f64,
    pub videos: f64,
    pub freq: f64,
    pub recency: f64,
}

impl FeatureVector {
    #[must_use]
    pub fn as_array(&self) -> [f64; 5] {
        [self.subs, self.views, self.videos, self.freq, self.recency]
    }

    #[must_use]
    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            subs: values[0],
            views: values[1],
            videos: values[2],
            freq: values[3],
            recency: values[4],
        }
    }
}

/// One ranked publisher in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    pub rank: u32,
    pub channel_id: CandidateId,
    pub channel_url: String,
    pub channel_name: String,
    pub channel_description: String,
    pub subscribers: u64,
    pub video_count: u64,
    pub views_total: u64,
    pub country: String,
    pub classification: Classification,
    pub latest_video_id: String,
    pub latest_video_title: String,
    pub latest_video_thumbnail: String,
    pub latest_video_published_at: Option<DateTime<Utc>>,
    pub latest_video_duration_sec: u64,
    pub raw_features: FeatureVector,
    pub normalized_features: FeatureVector,
    pub score: f64,
    pub discovered_via: SourceTag,
    pub generated_at_utc: DateTime<Utc>,
}

/// One run's complete ranked output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at_utc: DateTime<Utc>,
    pub date: NaiveDate,
    pub count: usize,
    pub items: Vec<ScoredRow>,
}

impl Snapshot {
    #[must_use]
    pub fn new(generated_at_utc: DateTime<Utc>, items: Vec<ScoredRow>) -> Self {
        Self {
            generated_at_utc,
            date: generated_at_utc.date_naive(),
            count: items.len(),
            items,
        }
    }

    #[must_use]
    pub fn empty(generated_at_utc: DateTime<Utc>) -> Self {
        Self::new(generated_at_utc, Vec::new())
    }
}

/// A history snapshot as read back by the rollup.
///
/// Every field is optional so that older or partially written files still
/// contribute whatever rows they carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistorySnapshot {
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub generated_at_utc: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryItem {
    #[serde(deserialize_with = "lenient::id")]
    pub channel_id: Option<String>,
    #[serde(deserialize_with = "lenient::rank")]
    pub rank: Option<u32>,
    #[serde(deserialize_with = "lenient::text")]
    pub channel_name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub channel_url: String,
    #[serde(deserialize_with = "lenient::count")]
    pub subscribers: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub video_count: u64,
    #[serde(deserialize_with = "lenient::text")]
    pub country: String,
    #[serde(deserialize_with = "lenient::classification")]
    pub classification: Option<Classification>,
    #[serde(deserialize_with = "lenient::text")]
    pub latest_video_id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub latest_video_title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub latest_video_thumbnail: String,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub latest_video_published_at: Option<DateTime<Utc>>,
}

/// Field readers that map wrongly typed values to "absent" instead of failing.
mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{Classification, HistoryItem};
    use crate::util::{text::parse_count, time::parse_rfc3339};

    pub(super) fn items<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<HistoryItem>, D::Error> {
        Ok(Option::<Vec<HistoryItem>>::deserialize(d)?.unwrap_or_default())
    }

    /// Non-string text (usually `null`) reads as empty.
    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => String::new(),
        })
    }

    pub(super) fn id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string))
    }

    pub(super) fn rank<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .filter(|rank| *rank > 0))
    }

    pub(super) fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            Value::String(s) => parse_count(&s),
            _ => 0,
        })
    }

    pub(super) fn classification<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Classification>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value.as_str().and_then(|raw| raw.parse().ok()))
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value.as_str().and_then(parse_rfc3339))
    }
}

/// A history snapshot together with the date taken from its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedSnapshot {
    pub date: NaiveDate,
    pub snapshot: HistorySnapshot,
}

/// Per-publisher aggregate over a trailing window of snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupEntry {
    pub rank: u32,
    pub channel_id: CandidateId,
    pub channel_name: String,
    pub channel_url: String,
    pub subscribers: u64,
    pub video_count: u64,
    pub country: String,
    pub classification: Classification,
    pub latest_video_id: String,
    pub latest_video_title: String,
    pub latest_video_thumbnail: String,
    pub latest_video_published_at: Option<DateTime<Utc>>,
    pub ranks: Vec<u32>,
    pub avg_rank: f64,
    pub best_rank: u32,
    pub appearances: usize,
    pub presence: f64,
    pub score: f64,
}

/// A windowed leaderboard built from several snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    pub generated_at_utc: DateTime<Utc>,
    /// Window tag such as `7d` or `30d`.
    pub range: String,
    pub window_days: u32,
    pub snapshots_considered: usize,
    pub items: Vec<RollupEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tag_serializes_lowercase() {
        let json = serde_json::to_string(&SourceTag::Discovered).expect("serialize");
        assert_eq!(json, "\"discovered\"");
        assert_eq!(SourceTag::Existing.as_str(), "existing");
    }

    #[test]
    fn classification_parses_case_insensitively() {
        assert_eq!("Podcast".parse::<Classification>(), Ok(Classification::Podcast));
        assert_eq!(" interview ".parse::<Classification>(), Ok(Classification::Interview));
        assert!("vlog".parse::<Classification>().is_err());
    }

    #[test]
    fn history_item_tolerates_missing_fields() {
        let raw = r#"{
            "items": [
                {"channel_id": "UC1", "rank": 3, "subscribers": "1,200",
                 "latest_video_published_at": "", "classification": "podcast"},
                {"channel_id": "UC2", "rank": "x", "classification": "vlog"},
                {"channel_name": "nameless"},
                {"channel_id": "UC4", "rank": 4, "channel_name": null, "channel_url": null,
                 "country": null, "latest_video_id": null, "latest_video_title": null,
                 "latest_video_thumbnail": 7}
            ]
        }"#;
        let parsed: HistorySnapshot = serde_json::from_str(raw).expect("lenient parse");
        assert_eq!(parsed.items.len(), 4);
        assert_eq!(parsed.items[0].rank, Some(3));
        assert_eq!(parsed.items[0].subscribers, 1200);
        assert!(parsed.items[0].latest_video_published_at.is_none());
        assert_eq!(parsed.items[0].classification, Some(Classification::Podcast));
        assert!(parsed.items[1].rank.is_none());
        assert!(parsed.items[1].classification.is_none());
        assert!(parsed.items[2].channel_id.is_none());
        assert!(parsed.generated_at_utc.is_none());

        let nulls = &parsed.items[3];
        assert_eq!(nulls.channel_id.as_deref(), Some("UC4"));
        assert_eq!(nulls.rank, Some(4));
        assert!(nulls.channel_name.is_empty());
        assert!(nulls.latest_video_title.is_empty());
        assert!(nulls.latest_video_thumbnail.is_empty());
    }

    #[test]
    fn history_snapshot_tolerates_null_items() {
        let parsed: HistorySnapshot =
            serde_json::from_str(r#"{"generated_at_utc": null, "items": null}"#).expect("lenient parse");
        assert!(parsed.items.is_empty());
    }

    #[test]
    fn snapshot_date_follows_generation_time() {
        let generated = DateTime::parse_from_rfc3339("2025-09-23T05:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let snapshot = Snapshot::empty(generated);
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2025, 9, 23).unwrap());
        assert_eq!(snapshot.count, 0);
    }
}
