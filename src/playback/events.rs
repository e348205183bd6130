use serde::Serialize;

use crate::{
    backend::MediaHandle,
    common::{DestinationId, MediaId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The transcoder consumed the whole input.
    Finished,
    Stopped,
    /// Another start or a skip took over the destination.
    Replaced,
    Failed,
}

/// Emitted on every session state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlaybackEvent {
    SessionStarted {
        destination: DestinationId,
        media: MediaHandle,
        position_ms: u64,
    },
    Paused {
        destination: DestinationId,
        position_ms: u64,
    },
    Resumed {
        destination: DestinationId,
        position_ms: u64,
    },
    Seeked {
        destination: DestinationId,
        position_ms: u64,
    },
    VolumeChanged {
        destination: DestinationId,
        volume: u16,
    },
    SessionEnded {
        destination: DestinationId,
        media_id: MediaId,
        position_ms: u64,
        reason: EndReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl PlaybackEvent {
    pub fn destination(&self) -> &DestinationId {
        match self {
            Self::SessionStarted { destination, .. }
            | Self::Paused { destination, .. }
            | Self::Resumed { destination, .. }
            | Self::Seeked { destination, .. }
            | Self::VolumeChanged { destination, .. }
            | Self::SessionEnded { destination, .. } => destination,
        }
    }
}
