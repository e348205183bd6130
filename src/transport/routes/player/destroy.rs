use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    common::{ApiError, DestinationId},
    server::AppState,
    transport::routes::error_response,
};

/// DELETE /v1/players/{destination}
pub async fn destroy_player(
    Path(destination): Path<DestinationId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("DELETE /v1/players/{}", destination);
    match state.manager.stop(&destination).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(ApiError::from_playback(
            &e,
            format!("/v1/players/{}", destination),
        )),
    }
}
