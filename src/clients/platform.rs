//! Capabilities the ranking pipeline needs from the content platform.
//!
//! The pipeline only ever talks to [`ContentPlatform`]; the HTTP client in
//! [`super::youtube`] is one implementation and in-memory fakes are another.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{CandidateId, EntityRecord, VideoProbe};

/// Failure of a single platform call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform quota exhausted: {0}")]
    QuotaExceeded(String),
    #[error("platform refused the request: {0}")]
    Forbidden(String),
    #[error("platform returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },
    #[error("failed to decode platform response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Quota and authorization failures end the current discovery loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlatformError::QuotaExceeded(_) | PlatformError::Forbidden(_)
        )
    }
}

/// One page of publisher search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub ids: Vec<CandidateId>,
    pub next_page_token: Option<String>,
}

/// One page of an upload feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait ContentPlatform: Send + Sync {
    /// Free-text publisher search, one page at a time.
    async fn search_publishers(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, PlatformError>;

    /// Resolves up to one batch of ids. Unknown ids are simply absent.
    async fn fetch_publishers(
        &self,
        ids: &[CandidateId],
    ) -> Result<Vec<EntityRecord>, PlatformError>;

    async fn fetch_upload_feed_page(
        &self,
        feed: &str,
        page_token: Option<&str>,
    ) -> Result<FeedPage, PlatformError>;

    /// Resolves up to one batch of video ids.
    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<VideoProbe>, PlatformError>;
}
