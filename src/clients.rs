pub mod platform;
pub mod youtube;

pub use platform::{ContentPlatform, FeedPage, PlatformError, SearchPage};
pub use youtube::{YouTubeClient, YouTubeConfig};
