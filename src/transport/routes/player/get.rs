use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{
    common::DestinationId,
    playback::{Progress, SessionSnapshot},
    server::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Players {
    pub players: Vec<SessionSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdlePlayer {
    destination: DestinationId,
    progress: Progress,
}

/// GET /v1/players
pub async fn get_players(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("GET /v1/players");
    let mut players: Vec<SessionSnapshot> = state
        .manager
        .views()
        .iter()
        .map(|view| view.snapshot())
        .collect();
    players.sort_by(|a, b| a.destination.cmp(&b.destination));
    Json(Players { players })
}

/// GET /v1/players/{destination}
pub async fn get_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!("GET /v1/players/{}", destination);
    match state.manager.view(&destination) {
        Some(view) => (StatusCode::OK, Json(view.snapshot())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(IdlePlayer {
                destination,
                progress: Progress::default(),
            }),
        )
            .into_response(),
    }
}
