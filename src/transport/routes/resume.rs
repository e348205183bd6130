use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{
    common::{ApiError, MediaId, format_duration},
    playback::ResumeEntry,
    server::AppState,
    transport::routes::error_response,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePoint {
    pub media_id: MediaId,
    #[serde(flatten)]
    pub entry: ResumeEntry,
    /// `position` rendered as `H:MM:SS`.
    pub formatted: String,
}

/// GET /v1/resume/{mediaId}
pub async fn get_resume(
    Path(media_id): Path<MediaId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!("GET /v1/resume/{}", media_id);
    match state.resume.entry(&media_id) {
        Some(entry) => (
            StatusCode::OK,
            Json(ResumePoint {
                formatted: format_duration(entry.position),
                media_id,
                entry,
            }),
        )
            .into_response(),
        None => error_response(ApiError::not_found(
            format!("No resume point for {}", media_id),
            format!("/v1/resume/{}", media_id),
        )),
    }
}

/// DELETE /v1/resume/{mediaId}
pub async fn clear_resume(
    Path(media_id): Path<MediaId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("DELETE /v1/resume/{}", media_id);
    if state.resume.clear(&media_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(ApiError::not_found(
            format!("No resume point for {}", media_id),
            format!("/v1/resume/{}", media_id),
        ))
    }
}
