use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the playback core.
///
/// Benign "nothing to do" results are not errors; see [`Outcome`].
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// Backend or resolver unreachable, or it answered with a non-success status.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The item resolved but carries no usable stream.
    #[error("not playable: {0}")]
    NotPlayable(String),

    /// The external transcoder could not be launched.
    #[error("transcoder failed to start: {0}")]
    ProcessSpawnFailure(String),

    /// The transcoder died mid-stream without being killed by us.
    #[error("transcoder exited abnormally (code {code:?}): {diagnostics}")]
    ProcessAbnormalExit {
        code: Option<i32>,
        diagnostics: String,
    },

    /// The real-time transport refused a join/publish/stop/leave.
    #[error("transport error: {0}")]
    Transport(String),

    /// Skip requested on an item with no following item.
    #[error("no next item available")]
    NoNextItem,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PlaybackError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UpstreamUnavailable(_) | Self::Transport(_) => 502,
            Self::NotPlayable(_) => 422,
            Self::NoNextItem => 404,
            Self::InvalidRequest(_) => 400,
            Self::ProcessSpawnFailure(_) | Self::ProcessAbnormalExit { .. } => 500,
        }
    }
}

/// I/O failures of the on-disk stores. Always logged and swallowed by callers.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of a control operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "reason")]
pub enum Outcome {
    Applied,
    Noop(NoopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoopReason {
    NoActiveSession,
    AlreadyPaused,
    NotPaused,
    /// A later start/stop on the same destination won the race.
    Superseded,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// JSON error body returned by the HTTP surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    /// Reason phrase, e.g. "Bad Gateway".
    pub error: String,
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: crate::common::types::now_ms(),
            status,
            error: reason_phrase(status).into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn from_playback(err: &PlaybackError, path: impl Into<String>) -> Self {
        Self::new(err.status_code(), err.to_string(), path)
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(404, message, path)
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}
