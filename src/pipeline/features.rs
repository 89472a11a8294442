//! Representative-video selection and raw feature extraction.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::{KeywordBlocker, heuristic_exclusion};
use crate::model::{EntityRecord, FeatureVector, VideoProbe};
use crate::util::time::days_between;

/// Trailing window for the upload-frequency signal.
pub const FREQUENCY_WINDOW_DAYS: f64 = 90.0;
/// One upload per week over the frequency window saturates the signal.
pub const FREQUENCY_SATURATION: f64 = 13.0;
/// e-folding time of the recency decay.
pub const RECENCY_DECAY_DAYS: f64 = 45.0;

/// Gates a video must pass to represent its publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoGates {
    pub min_duration_secs: u64,
    pub max_age_days: u32,
    pub min_views: u64,
}

impl VideoGates {
    /// Whether `video` passes every gate as of `as_of`.
    ///
    /// A video without a known publish time cannot prove its age and fails.
    #[must_use]
    pub fn accepts(&self, video: &VideoProbe, keywords: &KeywordBlocker, as_of: DateTime<Utc>) -> bool {
        let Some(published_at) = video.published_at else {
            return false;
        };
        video.duration_secs >= self.min_duration_secs
            && days_between(published_at, as_of) <= f64::from(self.max_age_days)
            && video.views >= self.min_views
            && heuristic_exclusion(&video.text_blob()).is_none()
            && !keywords.matches(&video.title)
    }
}

/// Newest video passing every gate, scanning in descending publish order.
#[must_use]
pub fn pick_latest_video<'a>(
    videos: &'a [VideoProbe],
    gates: &VideoGates,
    keywords: &KeywordBlocker,
    as_of: DateTime<Utc>,
) -> Option<&'a VideoProbe> {
    let mut ordered: Vec<&VideoProbe> = videos.iter().collect();
    ordered.sort_by_key(|video| Reverse(video.published_at));
    ordered
        .into_iter()
        .find(|video| gates.accepts(video, keywords, as_of))
}

/// Upload cadence derived from the inspected feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadActivity {
    pub uploads_in_window: usize,
    /// `None` when no inspected upload has a publish time.
    pub days_since_last_upload: Option<f64>,
}

#[must_use]
pub fn summarize_uploads(videos: &[VideoProbe], as_of: DateTime<Utc>) -> UploadActivity {
    let ages: Vec<f64> = videos
        .iter()
        .filter_map(|video| video.published_at)
        .map(|published_at| days_between(published_at, as_of))
        .collect();

    UploadActivity {
        uploads_in_window: ages.iter().filter(|age| **age <= FREQUENCY_WINDOW_DAYS).count(),
        days_since_last_upload: ages.into_iter().reduce(f64::min),
    }
}

#[allow(clippy::cast_precision_loss)]
fn log_count(count: u64) -> f64 {
    (count as f64 + 1.0).log10()
}

/// The five raw signals for one publisher.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn raw_features(entity: &EntityRecord, activity: &UploadActivity) -> FeatureVector {
    FeatureVector {
        subs: log_count(entity.subscribers),
        views: log_count(entity.views),
        videos: log_count(entity.videos),
        freq: (activity.uploads_in_window as f64 / FREQUENCY_SATURATION).min(1.0),
        recency: activity
            .days_since_last_upload
            .map_or(0.0, |days| (-days / RECENCY_DECAY_DAYS).exp()),
    }
}
