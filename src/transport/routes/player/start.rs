use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use super::PlayerChange;
use crate::{
    common::{ApiError, ChannelId, DestinationId, MediaId, PlaybackError},
    playback::{SourceRequest, StartRequest},
    server::AppState,
    transport::routes::{TimeValue, error_response},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SourceBody {
    Library {
        media_id: MediaId,
    },
    Url {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    External {
        url: String,
    },
}

impl From<SourceBody> for SourceRequest {
    fn from(body: SourceBody) -> Self {
        match body {
            SourceBody::Library { media_id } => Self::Library { media_id },
            SourceBody::Url { url, title } => Self::Url { url, title },
            SourceBody::External { url } => Self::External { url },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlayer {
    pub channel_id: ChannelId,
    pub source: SourceBody,
    /// Omitted: continue from the stored resume point.
    #[serde(default)]
    pub position: Option<TimeValue>,
    #[serde(default)]
    pub volume: Option<u16>,
}

/// POST /v1/players/{destination}
pub async fn start_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartPlayer>,
) -> impl IntoResponse {
    tracing::info!("POST /v1/players/{}\n{:?}", destination, body);
    let path = format!("/v1/players/{}", destination);

    let start_offset_ms = match &body.position {
        Some(position) => match position.to_ms() {
            Some(ms) => Some(ms),
            None => {
                let err = PlaybackError::InvalidRequest(format!("bad position {:?}", position));
                return error_response(ApiError::from_playback(&err, path));
            }
        },
        None => None,
    };

    let request = StartRequest {
        destination: destination.clone(),
        channel: body.channel_id,
        source: body.source.into(),
        start_offset_ms,
        volume: body.volume,
    };

    match state.manager.start(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(PlayerChange::new(&state.manager, &destination, vec![outcome])),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("[{}] Start failed: {}", destination, e);
            error_response(ApiError::from_playback(&e, path))
        }
    }
}
