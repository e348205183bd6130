use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use super::PlayerChange;
use crate::{
    common::{ApiError, DestinationId, PlaybackError},
    server::AppState,
    transport::routes::{TimeValue, error_response},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub position: Option<TimeValue>,
    /// Alias of `position`; `position` wins when both are sent.
    #[serde(default)]
    pub time: Option<TimeValue>,
    #[serde(default)]
    pub volume: Option<u16>,
}

/// PATCH /v1/players/{destination}
///
/// Fields are applied in the order volume, position, paused, so a seek in
/// the same request lands before the pause freezes the clock.
pub async fn update_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdatePlayer>,
) -> impl IntoResponse {
    tracing::info!("PATCH /v1/players/{}\n{:?}", destination, body);
    let path = format!("/v1/players/{}", destination);

    let seek_to = match body.position.as_ref().or(body.time.as_ref()) {
        Some(value) => match value.to_ms() {
            Some(ms) => Some(ms),
            None => {
                let err = PlaybackError::InvalidRequest(format!("bad position {:?}", value));
                return error_response(ApiError::from_playback(&err, path));
            }
        },
        None => None,
    };

    let manager = &state.manager;
    let mut results = Vec::new();

    if let Some(volume) = body.volume {
        match manager.set_volume(&destination, volume).await {
            Ok(outcome) => results.push(outcome),
            Err(e) => return error_response(ApiError::from_playback(&e, path)),
        }
    }

    if let Some(target) = seek_to {
        match manager.seek(&destination, target).await {
            Ok(outcome) => results.push(outcome),
            Err(e) => return error_response(ApiError::from_playback(&e, path)),
        }
    }

    if let Some(paused) = body.paused {
        let applied = if paused {
            manager.pause(&destination).await
        } else {
            manager.resume(&destination).await
        };
        match applied {
            Ok(outcome) => results.push(outcome),
            Err(e) => return error_response(ApiError::from_playback(&e, path)),
        }
    }

    (
        StatusCode::OK,
        Json(PlayerChange::new(manager, &destination, results)),
    )
        .into_response()
}
