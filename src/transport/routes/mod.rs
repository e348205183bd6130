pub mod info;
pub mod player;
pub mod resume;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::common::{ApiError, parse_timestamp};

pub(crate) fn error_response(err: ApiError) -> Response {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}

/// A point or span on the media timeline: a JSON number is milliseconds,
/// a string is a `H:MM:SS` / `MM:SS` / seconds timestamp.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Millis(u64),
    Timestamp(String),
}

impl TimeValue {
    pub fn to_ms(&self) -> Option<u64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Timestamp(raw) => parse_timestamp(raw),
        }
    }
}
