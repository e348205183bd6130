use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::Serialize;
use tokio::task::JoinHandle;

use super::clock::{PositionClock, Progress};
use crate::{
    backend::{MediaHandle, RemoteSession},
    common::{ChannelId, DestinationId, MediaId, PlaybackError},
    resolver::ResolvedMedia,
    transcode::{OutputGate, ProcessHandle, TranscodeInput},
};

/// Where a session's bytes come from.
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    /// Resolved through the media backend on every (re)start.
    Library { media_id: MediaId },
    /// Played as-is.
    Direct { url: String },
    /// Resolved once at start; the result is reused for restarts.
    External(ResolvedMedia),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Starting,
    Playing,
    Paused,
    Seeking,
    Transitioning,
}

pub struct ActivePipeline {
    pub id: u64,
    pub handle: ProcessHandle,
    pub gate: OutputGate,
    /// Task copying the pipeline's output into the transport.
    pub pump: JoinHandle<()>,
}

pub struct PlaybackSession {
    pub destination: DestinationId,
    pub channel: ChannelId,
    pub media: MediaHandle,
    pub source: PlaybackSource,
    pub clock: PositionClock,
    pub phase: SessionPhase,
    /// Set between killing a pipeline and confirming its replacement is live.
    pub transitioning: bool,
    /// Raised by the first byte any pipeline of this session delivers.
    pub started_publishing: Arc<AtomicBool>,
    pub volume: u16,
    pub pipeline: Option<ActivePipeline>,
    pub remote: RemoteSession,
}

impl PlaybackSession {
    pub fn new(
        destination: DestinationId,
        channel: ChannelId,
        media: MediaHandle,
        source: PlaybackSource,
        volume: u16,
        remote: RemoteSession,
    ) -> Self {
        Self {
            destination,
            channel,
            clock: PositionClock::new(media.duration_ms),
            media,
            source,
            phase: SessionPhase::Starting,
            transitioning: false,
            started_publishing: Arc::new(AtomicBool::new(false)),
            volume,
            pipeline: None,
            remote,
        }
    }

    pub fn has_started_publishing(&self) -> bool {
        self.started_publishing.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.phase == SessionPhase::Paused
    }

    pub fn pipeline_id(&self) -> Option<u64> {
        self.pipeline.as_ref().map(|p| p.id)
    }

    /// Fresh transcoder input. Library items open a new backend session each time.
    pub async fn acquire_input(&mut self) -> Result<TranscodeInput, PlaybackError> {
        let input = match &self.source {
            PlaybackSource::Library { media_id } => {
                let media_id = media_id.clone();
                let stream = self.remote.acquire(&media_id).await?;
                TranscodeInput {
                    url: stream.url,
                    headers: stream.headers,
                    audio_url: None,
                }
            }
            PlaybackSource::Direct { url } => TranscodeInput::new(url.clone()),
            PlaybackSource::External(resolved) => TranscodeInput {
                url: resolved.media_url.clone(),
                headers: resolved.headers.clone(),
                audio_url: resolved.audio_url.clone(),
            },
        };
        Ok(input)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            destination: self.destination.clone(),
            channel: self.channel.clone(),
            media: self.media.clone(),
            phase: self.phase,
            volume: self.volume,
            clock: self.clock,
            started_publishing: self.started_publishing.clone(),
        }
    }
}

/// Lock-free copy of a session's observable state.
#[derive(Clone)]
pub struct SessionView {
    pub destination: DestinationId,
    pub channel: ChannelId,
    pub media: MediaHandle,
    pub phase: SessionPhase,
    pub volume: u16,
    pub clock: PositionClock,
    started_publishing: Arc<AtomicBool>,
}

impl SessionView {
    pub fn progress(&self) -> Progress {
        self.clock.progress()
    }

    pub fn has_started_publishing(&self) -> bool {
        self.started_publishing.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            destination: self.destination.clone(),
            channel: self.channel.clone(),
            media: self.media.clone(),
            phase: self.phase,
            paused: self.clock.is_paused(),
            volume: self.volume,
            progress: self.progress(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub destination: DestinationId,
    pub channel: ChannelId,
    pub media: MediaHandle,
    pub phase: SessionPhase,
    pub paused: bool,
    pub volume: u16,
    pub progress: Progress,
}
