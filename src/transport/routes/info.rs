use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::{configs::StreamMode, server::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub semver: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub version: Version,
    pub build_time: u64,
    pub git: GitInfo,
    pub backend: String,
    pub stream_mode: StreamMode,
    pub active_sessions: usize,
    pub resume_points: usize,
    pub min_resume_ms: u64,
    pub uptime_ms: u64,
}

fn parse_version(raw: &str) -> Version {
    let mut parts = raw.split('.');
    let mut next = || {
        parts
            .next()
            .and_then(|s| s.split(['-', '+']).next())
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
    };
    let (major, minor, patch) = (next(), next(), next());
    Version {
        semver: raw.to_string(),
        major,
        minor,
        patch,
    }
}

/// GET /v1/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<Info> {
    tracing::debug!("GET /v1/info");
    Json(Info {
        version: parse_version(env!("CARGO_PKG_VERSION")),
        build_time: option_env!("BUILD_TIME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        git: GitInfo {
            branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
        },
        backend: state.manager.backend_name().to_string(),
        stream_mode: state.config.stream.mode,
        active_sessions: state.manager.active_count(),
        resume_points: state.resume.len(),
        min_resume_ms: state.resume.min_position_ms(),
        uptime_ms: state.uptime_ms(),
    })
}
