//! YouTube Data API v3 client implementing [`ContentPlatform`].
//!
//! Handles the API key, quota signalling and transient retries. Every
//! response is parsed leniently: counts and durations that fail to parse
//! become 0 rather than failing the batch.
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::platform::{ContentPlatform, FeedPage, PlatformError, SearchPage};
use crate::model::{CandidateId, EntityRecord, VideoProbe};
use crate::util::retry::RetryConfig;
use crate::util::text::{parse_count, parse_iso8601_duration};
use crate::util::time::parse_rfc3339;

const PAGE_SIZE: &str = "50";
const ERROR_BODY_LIMIT: usize = 300;
const QUOTA_REASONS: [&str; 3] = ["quotaExceeded", "rateLimitExceeded", "dailyLimitExceeded"];
const THUMBNAIL_PREFERENCE: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub base_url: String,
    pub api_key: String,
    /// Region hint passed to search; `None` leaves search unrestricted.
    pub region_code: Option<String>,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    base_url: Url,
    api_key: String,
    region_code: Option<String>,
    retry: RetryConfig,
}

impl YouTubeClient {
    /// # Errors
    /// Returns an error when the base URL does not parse or the HTTP client
    /// cannot be built.
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build YouTube HTTP client")?;

        let mut raw_base = config.base_url;
        if !raw_base.ends_with('/') {
            raw_base.push('/');
        }
        let base_url = Url::parse(&raw_base).context("invalid YouTube API base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            region_code: config.region_code,
            retry: config.retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let mut retries = 0;

        loop {
            match self.send_once(endpoint, params).await {
                Ok(value) => {
                    if retries > 0 {
                        info!(endpoint, retries, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let Some(delay) = self.retry.next_delay(&err, retries) else {
                        if retries > 0 {
                            warn!(
                                endpoint,
                                attempts = retries + 1,
                                max_retries = self.retry.max_retries,
                                error = %err,
                                "request failed after all retries"
                            );
                        }
                        return Err(err);
                    };

                    retries += 1;
                    warn!(
                        endpoint,
                        retry = retries,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "request failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|err| PlatformError::Transport {
                message: format!("failed to build {endpoint} URL: {err}"),
                retryable: false,
            })?;

        {
            let mut query_pairs = url.query_pairs_mut();
            for (name, value) in params {
                query_pairs.append_pair(name, value);
            }
            query_pairs.append_pair("key", &self.api_key);
        }

        debug!(endpoint, "calling YouTube API");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|err| PlatformError::Decode(err.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> PlatformError {
    PlatformError::Transport {
        retryable: err.is_timeout() || err.is_connect(),
        message: err.to_string(),
    }
}

fn status_error(status: StatusCode, body: &str) -> PlatformError {
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::QuotaExceeded(excerpt),
        StatusCode::FORBIDDEN if QUOTA_REASONS.iter().any(|reason| body.contains(reason)) => {
            PlatformError::QuotaExceeded(excerpt)
        }
        StatusCode::FORBIDDEN => PlatformError::Forbidden(excerpt),
        other => PlatformError::Status {
            status: other.as_u16(),
            body: excerpt,
        },
    }
}

#[async_trait]
impl ContentPlatform for YouTubeClient {
    async fn search_publishers(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, PlatformError> {
        let mut params = vec![
            ("part", "snippet"),
            ("type", "channel"),
            ("q", query),
            ("maxResults", PAGE_SIZE),
        ];
        if let Some(region) = self.region_code.as_deref() {
            params.push(("regionCode", region));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: SearchResponse = self.get_json("search", &params).await?;
        let ids = response
            .items
            .into_iter()
            .filter_map(|item| {
                item.snippet
                    .and_then(|snippet| snippet.channel_id)
                    .or_else(|| item.id.and_then(|id| id.channel_id))
            })
            .filter(|id| !id.is_empty())
            .map(CandidateId::new)
            .collect();

        Ok(SearchPage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_publishers(
        &self,
        ids: &[CandidateId],
    ) -> Result<Vec<EntityRecord>, PlatformError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(CandidateId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let params = [
            ("part", "snippet,statistics,contentDetails,brandingSettings"),
            ("id", joined.as_str()),
            ("maxResults", PAGE_SIZE),
        ];

        let response: ListResponse<ChannelResource> = self.get_json("channels", &params).await?;
        Ok(response
            .items
            .into_iter()
            .filter_map(ChannelResource::into_record)
            .collect())
    }

    async fn fetch_upload_feed_page(
        &self,
        feed: &str,
        page_token: Option<&str>,
    ) -> Result<FeedPage, PlatformError> {
        let mut params = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", feed),
            ("maxResults", PAGE_SIZE),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: ListResponse<PlaylistItemResource> =
            self.get_json("playlistItems", &params).await?;
        let video_ids = response
            .items
            .into_iter()
            .filter_map(PlaylistItemResource::video_id)
            .collect();

        Ok(FeedPage {
            video_ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<VideoProbe>, PlatformError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let params = [
            ("part", "snippet,contentDetails,statistics"),
            ("id", joined.as_str()),
            ("maxResults", PAGE_SIZE),
        ];

        let response: ListResponse<VideoResource> = self.get_json("videos", &params).await?;
        Ok(response
            .items
            .into_iter()
            .filter_map(VideoResource::into_probe)
            .collect())
    }
}

// Response shapes. Only the fields the pipeline reads are declared.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<SearchItemId>,
    snippet: Option<SearchSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

fn best_thumbnail(thumbnails: &HashMap<String, Thumbnail>) -> String {
    THUMBNAIL_PREFERENCE
        .iter()
        .find_map(|key| thumbnails.get(*key).and_then(|thumb| thumb.url.clone()))
        .unwrap_or_default()
}

/// Counts arrive as JSON strings; numbers are accepted too.
fn count_value(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(raw)) => parse_count(raw),
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    id: Option<String>,
    #[serde(default)]
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: HashMap<String, Value>,
    #[serde(default)]
    content_details: ChannelContentDetails,
    #[serde(default)]
    branding_settings: BrandingSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChannelSnippet {
    title: String,
    description: String,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BrandingSettings {
    channel: BrandingChannel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BrandingChannel {
    country: Option<String>,
}

impl ChannelResource {
    fn into_record(self) -> Option<EntityRecord> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let region = self
            .snippet
            .country
            .filter(|country| !country.trim().is_empty())
            .or(self.branding_settings.channel.country)
            .unwrap_or_default()
            .trim()
            .to_uppercase();

        Some(EntityRecord {
            url: format!("https://www.youtube.com/channel/{id}"),
            id: CandidateId::new(id),
            name: self.snippet.title,
            description: self.snippet.description,
            region,
            subscribers: count_value(self.statistics.get("subscriberCount")),
            views: count_value(self.statistics.get("viewCount")),
            videos: count_value(self.statistics.get("videoCount")),
            uploads_feed: self
                .content_details
                .related_playlists
                .uploads
                .filter(|feed| !feed.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemResource {
    content_details: Option<PlaylistItemContentDetails>,
    snippet: Option<PlaylistItemSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    resource_id: Option<PlaylistItemContentDetails>,
}

impl PlaylistItemResource {
    fn video_id(self) -> Option<String> {
        self.content_details
            .and_then(|details| details.video_id)
            .or_else(|| {
                self.snippet
                    .and_then(|snippet| snippet.resource_id)
                    .and_then(|resource| resource.video_id)
            })
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: Option<String>,
    #[serde(default)]
    snippet: VideoSnippet,
    #[serde(default)]
    content_details: VideoContentDetails,
    #[serde(default)]
    statistics: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    description: String,
    tags: Vec<String>,
    published_at: Option<String>,
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoContentDetails {
    duration: Option<String>,
}

impl VideoResource {
    fn into_probe(self) -> Option<VideoProbe> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let published_at = self.snippet.published_at.as_deref().and_then(parse_rfc3339);
        if published_at.is_none() {
            debug!(video_id = %id, "video has no parseable publish timestamp");
        }

        Some(VideoProbe {
            thumbnail: best_thumbnail(&self.snippet.thumbnails),
            id,
            title: self.snippet.title,
            description: self.snippet.description,
            tags: self.snippet.tags,
            published_at,
            duration_secs: self
                .content_details
                .duration
                .as_deref()
                .map_or(0, parse_iso8601_duration),
            views: count_value(self.statistics.get("viewCount")),
        })
    }
}
