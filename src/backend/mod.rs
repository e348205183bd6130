use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{BackendSessionId, MediaId, PlaybackError};

pub mod coordinator;
pub mod orphans;
pub mod plex;

pub use coordinator::RemoteSession;
pub use orphans::OrphanTracker;
pub use plex::PlexBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    /// Direct stream URL played as-is.
    Direct,
    /// Page URL resolved through the external resolver.
    External,
    #[default]
    Other,
}

/// Identifier plus display metadata of a playable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaHandle {
    pub id: MediaId,
    pub title: String,
    pub kind: MediaKind,
    /// Key of the show an episode belongs to.
    pub series_id: Option<String>,
    pub show_title: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// 0 when unknown.
    pub duration_ms: u64,
}

impl MediaHandle {
    pub fn new(id: impl Into<MediaId>, title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            series_id: None,
            show_title: None,
            season: None,
            episode: None,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_episodic(&self) -> bool {
        self.kind == MediaKind::Episode && self.series_id.is_some()
    }

    /// Human-readable label, e.g. `Show - S01E02 - Title`.
    pub fn label(&self) -> String {
        match (&self.show_title, self.season, self.episode) {
            (Some(show), Some(s), Some(e)) => {
                format!("{} - S{:02}E{:02} - {}", show, s, e, self.title)
            }
            _ => self.title.clone(),
        }
    }
}

/// A single-use playable handle returned by the backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayableStream {
    pub url: String,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
    /// Request headers the transcoder must send when reading `url`.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Remote media catalog the playback core consumes.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Metadata for a library item.
    async fn describe(&self, media: &MediaId) -> Result<MediaHandle, PlaybackError>;

    /// Opens `session` on the backend and returns a playable handle bound to it.
    async fn resolve_playable(
        &self,
        media: &MediaId,
        session: &BackendSessionId,
    ) -> Result<PlayableStream, PlaybackError>;

    /// Closes a backend session. Unknown or expired sessions are not an error.
    async fn terminate_session(&self, session: &BackendSessionId) -> Result<(), PlaybackError>;

    async fn adjacent_item(
        &self,
        media: &MediaHandle,
        direction: Direction,
    ) -> Result<Option<MediaHandle>, PlaybackError>;
}

/// Orders episodes by (season, episode) and steps one position from `current`.
pub fn step_episode(
    mut episodes: Vec<MediaHandle>,
    current: &MediaId,
    direction: Direction,
) -> Option<MediaHandle> {
    episodes.sort_by_key(|e| (e.season.unwrap_or(0), e.episode.unwrap_or(0)));
    let idx = episodes.iter().position(|e| &e.id == current)?;
    let target = match direction {
        Direction::Next => idx.checked_add(1)?,
        Direction::Previous => idx.checked_sub(1)?,
    };
    (target < episodes.len()).then(|| episodes.swap_remove(target))
}
