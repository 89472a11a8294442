use std::{env, time::Duration};

use thiserror::Error;

use crate::model::Classification;
use crate::pipeline::rank::RankMode;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
const TEST_ENV_KEYS: [&str; 31] = [
    "YT_API_KEY",
    "YT_API_BASE_URL",
    "YT_CONNECT_TIMEOUT_MS",
    "YT_TOTAL_TIMEOUT_MS",
    "HTTP_MAX_RETRIES",
    "HTTP_BACKOFF_BASE_MS",
    "HTTP_BACKOFF_CAP_MS",
    "REQUEST_PAUSE_MS",
    "TARGET_REGION",
    "SEARCH_REGION_CODE",
    "REGION_HINTS",
    "DISCOVERY_QUERIES",
    "DISCOVERY_MAX_IDS",
    "DISCOVERY_MAX_PAGES_PER_QUERY",
    "MAX_CANDIDATES",
    "PUBLISHER_BATCH_SIZE",
    "VIDEO_BATCH_SIZE",
    "UPLOAD_FEED_MAX_ITEMS",
    "MIN_DURATION_SEC",
    "MAX_VIDEO_AGE_DAYS",
    "MIN_VIDEO_VIEWS",
    "MIN_SUBSCRIBERS",
    "MIN_TOTAL_VIEWS",
    "FLOORS_BYPASS_FOR_SEEDS",
    "INTERVIEW_LABEL",
    "ACCEPTED_LABELS",
    "KEEP_WITHOUT_VIDEO",
    "RANK_MODE",
    "OUTPUT_CAP",
    "MIN_ROWS",
    "ROLLUP_WINDOWS",
];

/// Removes every variable `Config::from_env` reads. Callers hold `ENV_MUTEX`.
#[cfg(test)]
pub(crate) fn clear_test_env() {
    for key in TEST_ENV_KEYS {
        // SAFETY: env mutation is serialised by ENV_MUTEX.
        unsafe {
            env::remove_var(key);
        }
    }
}

/// The platform accepts at most this many ids per lookup call.
pub const PLATFORM_BATCH_CEILING: usize = 50;

const DEFAULT_QUERIES: &str = "podcast kenya,kenyan podcast,nairobi podcast,kenya talk show,kenyan interviews,JKLive,The Trend NTV,Cleaning The Airwaves,Presenter Ali interview,Obinna live,MIC CHEQUE podcast,Sandwich Podcast KE,ManTalk Ke podcast";
const DEFAULT_REGION_HINTS: &str = "kenya,kenyan,nairobi,mombasa,kisumu,nakuru,eldoret";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    yt_api_key: Option<String>,
    yt_api_base_url: String,
    yt_connect_timeout: Duration,
    yt_total_timeout: Duration,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    request_pause: Duration,
    target_region: String,
    search_region_code: String,
    region_hints: Vec<String>,
    discovery_queries: Vec<String>,
    discovery_max_ids: usize,
    discovery_max_pages_per_query: usize,
    max_candidates: usize,
    publisher_batch_size: usize,
    video_batch_size: usize,
    upload_feed_max_items: usize,
    min_duration_sec: u64,
    max_video_age_days: u32,
    min_video_views: u64,
    min_subscribers: u64,
    min_total_views: u64,
    floors_bypass_for_seeds: bool,
    interview_label: Classification,
    accepted_labels: Vec<Classification>,
    keep_without_video: bool,
    rank_mode: RankMode,
    output_cap: usize,
    min_rows: usize,
    rollup_windows: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Reads every tunable from the environment and validates it.
    ///
    /// The platform credential is read here but only demanded by
    /// [`Config::api_key`], so commands that never touch the network (rollup,
    /// channel list export) run without it.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when a value is present but does not
    /// parse or falls outside its allowed range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let yt_api_key = env::var("YT_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let yt_api_base_url = env::var("YT_API_BASE_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/youtube/v3/".to_string());

        let yt_connect_timeout = parse_duration_ms("YT_CONNECT_TIMEOUT_MS", 3000)?;
        let yt_total_timeout = parse_duration_ms("YT_TOTAL_TIMEOUT_MS", 30000)?;

        // Retry settings (exponential backoff + jitter)
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10000)?;
        let request_pause = parse_duration_ms("REQUEST_PAUSE_MS", 100)?;

        let target_region = env::var("TARGET_REGION")
            .unwrap_or_else(|_| "KE".to_string())
            .trim()
            .to_uppercase();
        let search_region_code = env::var("SEARCH_REGION_CODE")
            .map(|code| code.trim().to_uppercase())
            .unwrap_or_else(|_| target_region.clone());
        let region_hints = parse_csv("REGION_HINTS", DEFAULT_REGION_HINTS)
            .into_iter()
            .map(|hint| hint.to_lowercase())
            .collect();

        // Discovery and fetch bounds
        let discovery_queries = parse_csv("DISCOVERY_QUERIES", DEFAULT_QUERIES);
        let discovery_max_ids = parse_usize("DISCOVERY_MAX_IDS", 1500)?;
        let discovery_max_pages_per_query = parse_usize("DISCOVERY_MAX_PAGES_PER_QUERY", 2)?;
        let max_candidates = parse_usize("MAX_CANDIDATES", 1500)?;
        let publisher_batch_size = parse_batch_size("PUBLISHER_BATCH_SIZE")?;
        let video_batch_size = parse_batch_size("VIDEO_BATCH_SIZE")?;
        let upload_feed_max_items = parse_usize("UPLOAD_FEED_MAX_ITEMS", 30)?;

        // Representative video gates
        let min_duration_sec = parse_u64("MIN_DURATION_SEC", 300)?;
        let max_video_age_days = parse_u32("MAX_VIDEO_AGE_DAYS", 365)?;
        let min_video_views = parse_u64("MIN_VIDEO_VIEWS", 0)?;

        // Inclusion policy
        let min_subscribers = parse_u64("MIN_SUBSCRIBERS", 0)?;
        let min_total_views = parse_u64("MIN_TOTAL_VIEWS", 0)?;
        let floors_bypass_for_seeds = parse_bool("FLOORS_BYPASS_FOR_SEEDS", true)?;
        let interview_label = parse_label("INTERVIEW_LABEL", "interview")?;
        if interview_label == Classification::Other {
            return Err(ConfigError::Invalid {
                name: "INTERVIEW_LABEL",
                source: anyhow::anyhow!("must be `interview` or `podcast`"),
            });
        }
        let accepted_labels = parse_labels("ACCEPTED_LABELS", "podcast,interview")?;
        let keep_without_video = parse_bool("KEEP_WITHOUT_VIDEO", true)?;

        // Output
        let rank_mode = env::var("RANK_MODE")
            .unwrap_or_else(|_| "composite".to_string())
            .parse::<RankMode>()
            .map_err(|error| ConfigError::Invalid {
                name: "RANK_MODE",
                source: anyhow::anyhow!(error),
            })?;
        let output_cap = parse_usize("OUTPUT_CAP", 500)?;
        let min_rows = parse_usize("MIN_ROWS", 0)?;
        let rollup_windows = parse_windows("ROLLUP_WINDOWS", "7,30")?;

        Ok(Self {
            yt_api_key,
            yt_api_base_url,
            yt_connect_timeout,
            yt_total_timeout,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            request_pause,
            target_region,
            search_region_code,
            region_hints,
            discovery_queries,
            discovery_max_ids,
            discovery_max_pages_per_query,
            max_candidates,
            publisher_batch_size,
            video_batch_size,
            upload_feed_max_items,
            min_duration_sec,
            max_video_age_days,
            min_video_views,
            min_subscribers,
            min_total_views,
            floors_bypass_for_seeds,
            interview_label,
            accepted_labels,
            keep_without_video,
            rank_mode,
            output_cap,
            min_rows,
            rollup_windows,
        })
    }

    /// The platform credential.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when `YT_API_KEY` is unset or blank.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.yt_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("YT_API_KEY"))
    }

    #[must_use]
    pub fn yt_api_base_url(&self) -> &str {
        &self.yt_api_base_url
    }

    #[must_use]
    pub fn yt_connect_timeout(&self) -> Duration {
        self.yt_connect_timeout
    }

    #[must_use]
    pub fn yt_total_timeout(&self) -> Duration {
        self.yt_total_timeout
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }

    #[must_use]
    pub fn request_pause(&self) -> Duration {
        self.request_pause
    }

    #[must_use]
    pub fn target_region(&self) -> &str {
        &self.target_region
    }

    /// Region hint for search; empty disables the hint.
    #[must_use]
    pub fn search_region_code(&self) -> Option<&str> {
        Some(self.search_region_code.as_str()).filter(|code| !code.is_empty())
    }

    #[must_use]
    pub fn region_hints(&self) -> &[String] {
        &self.region_hints
    }

    #[must_use]
    pub fn discovery_queries(&self) -> &[String] {
        &self.discovery_queries
    }

    #[must_use]
    pub fn discovery_max_ids(&self) -> usize {
        self.discovery_max_ids
    }

    #[must_use]
    pub fn discovery_max_pages_per_query(&self) -> usize {
        self.discovery_max_pages_per_query
    }

    #[must_use]
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    #[must_use]
    pub fn publisher_batch_size(&self) -> usize {
        self.publisher_batch_size
    }

    #[must_use]
    pub fn video_batch_size(&self) -> usize {
        self.video_batch_size
    }

    #[must_use]
    pub fn upload_feed_max_items(&self) -> usize {
        self.upload_feed_max_items
    }

    #[must_use]
    pub fn min_duration_sec(&self) -> u64 {
        self.min_duration_sec
    }

    #[must_use]
    pub fn max_video_age_days(&self) -> u32 {
        self.max_video_age_days
    }

    #[must_use]
    pub fn min_video_views(&self) -> u64 {
        self.min_video_views
    }

    #[must_use]
    pub fn min_subscribers(&self) -> u64 {
        self.min_subscribers
    }

    #[must_use]
    pub fn min_total_views(&self) -> u64 {
        self.min_total_views
    }

    #[must_use]
    pub fn floors_bypass_for_seeds(&self) -> bool {
        self.floors_bypass_for_seeds
    }

    #[must_use]
    pub fn interview_label(&self) -> Classification {
        self.interview_label
    }

    #[must_use]
    pub fn accepted_labels(&self) -> &[Classification] {
        &self.accepted_labels
    }

    #[must_use]
    pub fn keep_without_video(&self) -> bool {
        self.keep_without_video
    }

    #[must_use]
    pub fn rank_mode(&self) -> RankMode {
        self.rank_mode
    }

    #[must_use]
    pub fn output_cap(&self) -> usize {
        self.output_cap
    }

    #[must_use]
    pub fn min_rows(&self) -> usize {
        self.min_rows
    }

    #[must_use]
    pub fn rollup_windows(&self) -> &[u32] {
        &self.rollup_windows
    }
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

/// Batch sizes are clamped into `1..=PLATFORM_BATCH_CEILING`.
fn parse_batch_size(name: &'static str) -> Result<usize, ConfigError> {
    let value = parse_usize(name, PLATFORM_BATCH_CEILING)?;
    Ok(value.clamp(1, PLATFORM_BATCH_CEILING))
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_label(name: &'static str, default: &str) -> Result<Classification, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<Classification>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(error),
        })
}

fn parse_labels(name: &'static str, default: &str) -> Result<Vec<Classification>, ConfigError> {
    let labels = parse_csv(name, default)
        .iter()
        .map(|raw| raw.parse::<Classification>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(error),
        })?;
    if labels.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("at least one label is required"),
        });
    }
    Ok(labels)
}

fn parse_windows(name: &'static str, default: &str) -> Result<Vec<u32>, ConfigError> {
    let mut windows = Vec::new();
    for raw in parse_csv(name, default) {
        let days = raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })?;
        if days == 0 {
            return Err(ConfigError::Invalid {
                name,
                source: anyhow::anyhow!("window must be at least one day"),
            });
        }
        if !windows.contains(&days) {
            windows.push(days);
        }
    }
    Ok(windows)
}

fn parse_csv(name: &'static str, default: &str) -> Vec<String> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
