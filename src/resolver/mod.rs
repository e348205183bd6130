use async_trait::async_trait;
use serde::Serialize;

use crate::common::PlaybackError;

pub mod ytdlp;

pub use ytdlp::YtDlpResolver;

/// Direct media location for a third-party page URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMedia {
    pub title: String,
    /// 0 for live or unknown.
    pub duration_ms: u64,
    pub media_url: String,
    /// Set when the site serves video and audio as separate streams.
    pub audio_url: Option<String>,
    pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve_info(&self, url: &str) -> Result<ResolvedMedia, PlaybackError>;
}
