use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use super::PlayerChange;
use crate::{
    common::{ApiError, DestinationId, Outcome, PlaybackError},
    playback::DEFAULT_JUMP_MS,
    server::AppState,
    transport::routes::{TimeValue, error_response},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jump {
    #[serde(default)]
    pub amount: Option<TimeValue>,
}

impl Jump {
    fn amount_ms(body: Option<Json<Jump>>) -> Option<u64> {
        match body.and_then(|Json(jump)| jump.amount) {
            Some(amount) => amount.to_ms(),
            None => Some(DEFAULT_JUMP_MS),
        }
    }
}

fn respond(
    state: &AppState,
    destination: &DestinationId,
    path: String,
    result: Result<Outcome, PlaybackError>,
) -> Response {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(PlayerChange::new(&state.manager, destination, vec![outcome])),
        )
            .into_response(),
        Err(e) => error_response(ApiError::from_playback(&e, path)),
    }
}

/// POST /v1/players/{destination}/skip
pub async fn skip_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("POST /v1/players/{}/skip", destination);
    let result = state.manager.skip(&destination).await;
    respond(&state, &destination, format!("/v1/players/{}/skip", destination), result)
}

/// POST /v1/players/{destination}/forward
pub async fn forward_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<Jump>>,
) -> impl IntoResponse {
    tracing::info!("POST /v1/players/{}/forward", destination);
    let path = format!("/v1/players/{}/forward", destination);
    let Some(amount) = Jump::amount_ms(body) else {
        let err = PlaybackError::InvalidRequest("bad amount".into());
        return error_response(ApiError::from_playback(&err, path));
    };
    let result = state.manager.fast_forward(&destination, amount).await;
    respond(&state, &destination, path, result)
}

/// POST /v1/players/{destination}/rewind
pub async fn rewind_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<Jump>>,
) -> impl IntoResponse {
    tracing::info!("POST /v1/players/{}/rewind", destination);
    let path = format!("/v1/players/{}/rewind", destination);
    let Some(amount) = Jump::amount_ms(body) else {
        let err = PlaybackError::InvalidRequest("bad amount".into());
        return error_response(ApiError::from_playback(&err, path));
    };
    let result = state.manager.rewind(&destination, amount).await;
    respond(&state, &destination, path, result)
}
