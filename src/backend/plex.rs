use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Direction, MediaBackend, MediaHandle, MediaKind, PlayableStream, step_episode};
use crate::{
    common::{BackendSessionId, HttpClient, MediaId, PlaybackError},
    configs::PlexConfig,
};

pub struct PlexBackend {
    client: Client,
    base_url: String,
    token: String,
    client_identifier: String,
    product: String,
}

impl PlexBackend {
    pub fn new(config: &PlexConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: config.base_url().to_string(),
            token: config.token.clone(),
            client_identifier: config.client_identifier.clone(),
            product: config.product.clone(),
        })
    }

    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, endpoint))
            .header("X-Plex-Token", &self.token)
            .header("X-Plex-Client-Identifier", &self.client_identifier)
            .header("X-Plex-Product", &self.product)
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value, PlaybackError> {
        let resp = self
            .request(endpoint)
            .send()
            .await
            .map_err(|e| PlaybackError::UpstreamUnavailable(format!("plex request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(PlaybackError::UpstreamUnavailable(format!(
                "plex returned {} for {}",
                resp.status(),
                endpoint
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| PlaybackError::UpstreamUnavailable(format!("invalid plex response: {}", e)))
    }

    async fn metadata(&self, media: &MediaId) -> Result<Value, PlaybackError> {
        let body = self
            .get_json(&format!("/library/metadata/{}", urlencoding::encode(media)))
            .await?;
        first(&body["MediaContainer"]["Metadata"])
            .cloned()
            .ok_or_else(|| PlaybackError::NotPlayable(format!("no metadata for {}", media)))
    }
}

#[async_trait]
impl MediaBackend for PlexBackend {
    fn name(&self) -> &str {
        "plex"
    }

    async fn describe(&self, media: &MediaId) -> Result<MediaHandle, PlaybackError> {
        let item = self.metadata(media).await?;
        parse_item(&item).ok_or_else(|| PlaybackError::NotPlayable(format!("malformed metadata for {}", media)))
    }

    async fn resolve_playable(
        &self,
        media: &MediaId,
        session: &BackendSessionId,
    ) -> Result<PlayableStream, PlaybackError> {
        let item = self.metadata(media).await?;
        let mut stream = playable_from(&item, &self.base_url, &self.token)
            .ok_or_else(|| PlaybackError::NotPlayable(format!("{} has no playable part", media)))?;

        stream.headers = vec![
            ("X-Plex-Client-Identifier".to_string(), self.client_identifier.clone()),
            ("X-Plex-Product".to_string(), self.product.clone()),
            ("X-Plex-Session-Identifier".to_string(), session.to_string()),
        ];
        debug!(
            "Resolved {} ({}) container={:?} video={:?} audio={:?}",
            media, session, stream.container, stream.video_codec, stream.audio_codec
        );
        Ok(stream)
    }

    async fn terminate_session(&self, session: &BackendSessionId) -> Result<(), PlaybackError> {
        let endpoint = format!(
            "/video/:/transcode/universal/stop?session={}",
            urlencoding::encode(session)
        );
        let resp = self
            .request(&endpoint)
            .header("X-Plex-Session-Identifier", session.0.as_str())
            .send()
            .await
            .map_err(|e| PlaybackError::UpstreamUnavailable(format!("plex request failed: {}", e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Backend session {} already gone", session);
                Ok(())
            }
            s => Err(PlaybackError::UpstreamUnavailable(format!(
                "plex refused to stop session {}: {}",
                session, s
            ))),
        }
    }

    async fn adjacent_item(
        &self,
        media: &MediaHandle,
        direction: Direction,
    ) -> Result<Option<MediaHandle>, PlaybackError> {
        let Some(show) = media.series_id.as_deref().filter(|_| media.kind == MediaKind::Episode)
        else {
            return Ok(None);
        };

        let body = self
            .get_json(&format!("/library/metadata/{}/allLeaves", urlencoding::encode(show)))
            .await?;
        let episodes: Vec<MediaHandle> = all(&body["MediaContainer"]["Metadata"])
            .iter()
            .filter_map(parse_item)
            .collect();

        if episodes.is_empty() {
            warn!("Show {} returned no episodes", show);
        }
        Ok(step_episode(episodes, &media.id, direction))
    }
}

/// Plex returns either a single object or an array for list fields.
fn all(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn first(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}

/// Numbers arrive as either JSON numbers or strings.
fn number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_item(item: &Value) -> Option<MediaHandle> {
    let id = string(&item["ratingKey"])?;
    let kind = match item["type"].as_str() {
        Some("movie") => MediaKind::Movie,
        Some("episode") => MediaKind::Episode,
        _ => MediaKind::Other,
    };

    Some(MediaHandle {
        id: MediaId(id),
        title: item["title"].as_str().unwrap_or("Unknown").to_string(),
        kind,
        series_id: string(&item["grandparentRatingKey"]),
        show_title: item["grandparentTitle"].as_str().map(str::to_string),
        season: number(&item["parentIndex"]).map(|n| n as u32),
        episode: number(&item["index"]).map(|n| n as u32),
        duration_ms: number(&item["duration"]).unwrap_or(0),
    })
}

pub(crate) fn playable_from(item: &Value, base_url: &str, token: &str) -> Option<PlayableStream> {
    let media = first(&item["Media"])?;
    let part = first(&media["Part"])?;
    let key = part["key"].as_str()?;

    Some(PlayableStream {
        url: format!("{}{}?X-Plex-Token={}", base_url, key, urlencoding::encode(token)),
        container: part["container"]
            .as_str()
            .or_else(|| media["container"].as_str())
            .map(str::to_string),
        video_codec: media["videoCodec"].as_str().map(str::to_string),
        audio_codec: media["audioCodec"].as_str().map(str::to_string),
        bitrate_kbps: number(&media["bitrate"]).map(|b| b as u32),
        headers: Vec::new(),
    })
}
