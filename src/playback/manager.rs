//! Per-destination playback state machine.
//!
//! Every control operation on a destination runs under that destination's
//! async lock, so operations apply in the order they were issued. `start` and
//! `stop` additionally cancel the destination's token, which makes any
//! in-flight acquire/spawn of an earlier operation discard its result.
//!
//! Restarts always run kill, then acquire, then spawn. Pipeline exits are
//! delivered over a channel tagged with the pipeline id; an exit whose id is
//! not the session's current pipeline, or that arrives while the session is
//! transitioning, is dropped.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    clock::Progress,
    events::{EndReason, PlaybackEvent},
    resume::ResumeStore,
    session::{ActivePipeline, PlaybackSession, PlaybackSource, SessionPhase, SessionView},
};
use crate::{
    backend::{Direction, MediaBackend, MediaHandle, MediaKind, OrphanTracker, RemoteSession},
    common::{ChannelId, DestinationId, MediaId, NoopReason, Outcome, PlaybackError, format_duration},
    configs::StreamConfig,
    resolver::MediaResolver,
    stream::StreamTransport,
    transcode::{OutputGate, PipelineReader, ProcessExit, ProcessHandle, TranscodeOptions, Transcoder},
};

pub const MAX_VOLUME: u16 = 200;
pub const DEFAULT_VOLUME: u16 = 100;
pub const DEFAULT_JUMP_MS: u64 = 30_000;

/// Natural ends this close to the end count as "watched".
const COMPLETION_WINDOW_MS: u64 = 60_000;
const COMPLETION_FRACTION: f64 = 0.02;

const EVENT_CAPACITY: usize = 256;
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborators the manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn MediaBackend>,
    pub resolver: Arc<dyn MediaResolver>,
    pub transcoder: Arc<dyn Transcoder>,
    pub transport: Arc<dyn StreamTransport>,
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub stream: StreamConfig,
    /// Pause after a confirmed kill before the next backend session is opened.
    pub kill_grace: Duration,
}

/// What to play.
#[derive(Debug, Clone)]
pub enum SourceRequest {
    Library { media_id: MediaId },
    Url { url: String, title: Option<String> },
    External { url: String },
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub destination: DestinationId,
    pub channel: ChannelId,
    pub source: SourceRequest,
    /// `None` continues from the stored resume point, if any.
    pub start_offset_ms: Option<u64>,
    pub volume: Option<u16>,
}

struct PipelineExit {
    destination: DestinationId,
    pipeline: u64,
    exit: ProcessExit,
    publish: Result<(), PlaybackError>,
}

enum Launch {
    Live,
    Superseded,
}

struct SessionSlot {
    state: tokio::sync::Mutex<Option<PlaybackSession>>,
    cancel: Mutex<CancellationToken>,
    view: RwLock<Option<SessionView>>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            view: RwLock::new(None),
        }
    }

    /// Cancels whatever is in flight and hands out a fresh token.
    fn preempt(&self) -> CancellationToken {
        let mut cancel = self.cancel.lock();
        cancel.cancel();
        *cancel = CancellationToken::new();
        cancel.clone()
    }

    fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    fn publish_view(&self, session: &PlaybackSession) {
        *self.view.write() = Some(session.view());
    }

    fn clear_view(&self) {
        *self.view.write() = None;
    }

    /// No session, and no operation currently holding the state lock.
    fn is_vacant(&self) -> bool {
        self.view.read().is_none() && self.state.try_lock().is_ok_and(|state| state.is_none())
    }
}

struct Inner {
    slots: DashMap<DestinationId, Arc<SessionSlot>>,
    collab: Collaborators,
    resume: Arc<ResumeStore>,
    orphans: Arc<OrphanTracker>,
    settings: ManagerSettings,
    events: broadcast::Sender<PlaybackEvent>,
    exits: flume::Sender<PipelineExit>,
    pipeline_seq: AtomicU64,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Must be called inside a tokio runtime; spawns the exit watcher.
    pub fn new(
        collab: Collaborators,
        resume: Arc<ResumeStore>,
        orphans: Arc<OrphanTracker>,
        settings: ManagerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (exits, exit_rx) = flume::unbounded();

        let inner = Arc::new(Inner {
            slots: DashMap::new(),
            collab,
            resume,
            orphans,
            settings,
            events,
            exits,
            pipeline_seq: AtomicU64::new(0),
        });

        tokio::spawn(watch_exits(Arc::downgrade(&inner), exit_rx));
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    pub fn resume_store(&self) -> &Arc<ResumeStore> {
        &self.inner.resume
    }

    fn slot(&self, destination: &DestinationId) -> Option<Arc<SessionSlot>> {
        self.inner.slots.get(destination).map(|s| s.value().clone())
    }

    fn slot_or_create(&self, destination: &DestinationId) -> Arc<SessionSlot> {
        self.inner
            .slots
            .entry(destination.clone())
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .value()
            .clone()
    }

    /// Drops the destination's slot once it is vacant and nothing else holds it.
    fn prune_slot(&self, destination: &DestinationId) {
        if self
            .inner
            .slots
            .remove_if(destination, |_, slot| Arc::strong_count(slot) == 1 && slot.is_vacant())
            .is_some()
        {
            debug!("[{}] Released idle slot", destination);
        }
    }

    pub fn backend_name(&self) -> &str {
        self.inner.collab.backend.name()
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.inner.events.send(event);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All-zero when nothing is playing on `destination`.
    pub fn get_progress(&self, destination: &DestinationId) -> Progress {
        self.view(destination)
            .map(|v| v.progress())
            .unwrap_or_default()
    }

    pub fn view(&self, destination: &DestinationId) -> Option<SessionView> {
        self.slot(destination)?.view.read().clone()
    }

    pub fn views(&self) -> Vec<SessionView> {
        self.inner
            .slots
            .iter()
            .filter_map(|slot| slot.view.read().clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.view.read().is_some())
            .count()
    }

    // ------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------

    pub async fn start(&self, req: StartRequest) -> Result<Outcome, PlaybackError> {
        let destination = req.destination.clone();
        let result = self.start_session(req).await;
        self.prune_slot(&destination);
        result
    }

    async fn start_session(&self, req: StartRequest) -> Result<Outcome, PlaybackError> {
        let slot = self.slot_or_create(&req.destination);
        let token = slot.preempt();
        let mut state = slot.state.lock().await;
        if token.is_cancelled() {
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }

        if let Some(previous) = state.take() {
            info!(
                "[{}] Replacing {} with a new session",
                req.destination,
                previous.media.label()
            );
            slot.clear_view();
            let killed = self.end_session(previous, EndReason::Replaced, None, true).await;
            if !self.wait_kill_grace(killed, &token).await {
                return Ok(Outcome::Noop(NoopReason::Superseded));
            }
        }

        let resolved = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Outcome::Noop(NoopReason::Superseded)),
            resolved = self.resolve_source(&req.source) => resolved?,
        };
        let (media, source) = resolved;

        let offset = match req.start_offset_ms {
            Some(offset) => offset,
            None => self.inner.resume.get(&media.id).unwrap_or(0),
        };

        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            joined = self.inner.collab.transport.join(&req.destination, &req.channel) => Some(joined),
        };
        match joined {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e),
            None => {
                let _ = self.inner.collab.transport.leave(&req.destination).await;
                return Ok(Outcome::Noop(NoopReason::Superseded));
            }
        }

        let session = PlaybackSession::new(
            req.destination.clone(),
            req.channel.clone(),
            media,
            source,
            req.volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME),
            self.remote_session(),
        );

        self.launch_new(&slot, &mut state, session, offset, &token).await
    }

    /// Freezes the clock, kills the pipeline and records the resume point.
    /// The backend session is left alone; the next acquire replaces it.
    pub async fn pause(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        let Some(slot) = self.slot(destination) else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        let token = slot.token();
        let mut state = slot.state.lock().await;
        if token.is_cancelled() {
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }
        let Some(session) = state.as_mut() else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        if session.is_paused() {
            return Ok(Outcome::Noop(NoopReason::AlreadyPaused));
        }

        let position = session.clock.freeze();
        session.transitioning = true;
        session.phase = SessionPhase::Transitioning;
        slot.publish_view(session);
        self.shut_pipeline(session).await;

        if session.has_started_publishing() {
            self.inner
                .resume
                .put(&session.media.id, position, &session.media.label());
        }

        session.phase = SessionPhase::Paused;
        session.transitioning = false;
        slot.publish_view(session);
        info!("[{}] Paused at {}", destination, format_duration(position));

        self.emit(PlaybackEvent::Paused {
            destination: destination.clone(),
            position_ms: position,
        });
        Ok(Outcome::Applied)
    }

    pub async fn resume(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        self.restart(destination, RestartKind::Resume).await
    }

    pub async fn seek(&self, destination: &DestinationId, target_ms: u64) -> Result<Outcome, PlaybackError> {
        self.restart(destination, RestartKind::SeekTo(target_ms)).await
    }

    pub async fn fast_forward(&self, destination: &DestinationId, amount_ms: u64) -> Result<Outcome, PlaybackError> {
        self.restart(destination, RestartKind::Forward(amount_ms)).await
    }

    pub async fn rewind(&self, destination: &DestinationId, amount_ms: u64) -> Result<Outcome, PlaybackError> {
        self.restart(destination, RestartKind::Back(amount_ms)).await
    }

    /// Playing sessions restart at the current position with the new gain;
    /// paused ones only store it for the next resume.
    pub async fn set_volume(&self, destination: &DestinationId, percent: u16) -> Result<Outcome, PlaybackError> {
        self.restart(destination, RestartKind::Volume(percent.min(MAX_VOLUME)))
            .await
    }

    /// Replaces the current episode with the next one without leaving the channel.
    pub async fn skip(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        let result = self.skip_to_next(destination).await;
        self.prune_slot(destination);
        result
    }

    async fn skip_to_next(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        let Some(slot) = self.slot(destination) else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        let token = slot.token();
        let mut state = slot.state.lock().await;
        if token.is_cancelled() {
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }
        let Some(session) = state.as_ref() else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        if !session.media.is_episodic() {
            return Err(PlaybackError::NoNextItem);
        }

        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Outcome::Noop(NoopReason::Superseded)),
            next = self.inner.collab.backend.adjacent_item(&session.media, Direction::Next) => next?,
        };
        let Some(next) = next else {
            return Err(PlaybackError::NoNextItem);
        };

        let Some(current) = state.take() else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        info!(
            "[{}] Skipping {} -> {}",
            destination,
            current.media.label(),
            next.label()
        );
        let channel = current.channel.clone();
        let volume = current.volume;
        let killed = self.end_session(current, EndReason::Replaced, None, false).await;
        if !self.wait_kill_grace(killed, &token).await {
            slot.clear_view();
            if let Err(e) = self.inner.collab.transport.leave(destination).await {
                warn!("[{}] Transport leave failed: {}", destination, e);
            }
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }

        let offset = self.inner.resume.get(&next.id).unwrap_or(0);
        let session = PlaybackSession::new(
            destination.clone(),
            channel,
            next.clone(),
            PlaybackSource::Library { media_id: next.id },
            volume,
            self.remote_session(),
        );

        let outcome = self.launch_new(&slot, &mut state, session, offset, &token).await;
        if state.is_none() {
            slot.clear_view();
        }
        outcome
    }

    /// Idempotent; a destination without a session is a no-op.
    pub async fn stop(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        let result = self.stop_session(destination).await;
        self.prune_slot(destination);
        result
    }

    async fn stop_session(&self, destination: &DestinationId) -> Result<Outcome, PlaybackError> {
        let Some(slot) = self.slot(destination) else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        slot.preempt();
        let mut state = slot.state.lock().await;
        let Some(session) = state.take() else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };

        slot.clear_view();
        self.end_session(session, EndReason::Stopped, None, true).await;
        Ok(Outcome::Applied)
    }

    pub async fn stop_all(&self) {
        let destinations: Vec<DestinationId> = self
            .inner
            .slots
            .iter()
            .map(|slot| slot.key().clone())
            .collect();

        let results = join_all(destinations.iter().map(|d| self.stop(d))).await;
        for (destination, result) in destinations.iter().zip(results) {
            if let Err(e) = result {
                warn!("[{}] Failed to stop during shutdown: {}", destination, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn remote_session(&self) -> RemoteSession {
        RemoteSession::new(self.inner.collab.backend.clone(), self.inner.orphans.clone())
    }

    async fn resolve_source(
        &self,
        source: &SourceRequest,
    ) -> Result<(MediaHandle, PlaybackSource), PlaybackError> {
        match source {
            SourceRequest::Library { media_id } => {
                let media = self.inner.collab.backend.describe(media_id).await?;
                Ok((
                    media,
                    PlaybackSource::Library {
                        media_id: media_id.clone(),
                    },
                ))
            }
            SourceRequest::Url { url, .. } | SourceRequest::External { url } if url.trim().is_empty() => {
                Err(PlaybackError::InvalidRequest("source url is empty".into()))
            }
            SourceRequest::Url { url, title } => {
                let media = MediaHandle::new(
                    MediaId::for_url(url),
                    title.clone().unwrap_or_else(|| url.clone()),
                    MediaKind::Direct,
                );
                Ok((media, PlaybackSource::Direct { url: url.clone() }))
            }
            SourceRequest::External { url } => {
                let resolved = self.inner.collab.resolver.resolve_info(url).await?;
                let media = MediaHandle::new(MediaId::for_url(url), resolved.title.clone(), MediaKind::External)
                    .with_duration(resolved.duration_ms);
                Ok((media, PlaybackSource::External(resolved)))
            }
        }
    }

    /// Launches the first pipeline of `session` and registers it on success.
    async fn launch_new(
        &self,
        slot: &SessionSlot,
        state: &mut Option<PlaybackSession>,
        mut session: PlaybackSession,
        offset_ms: u64,
        token: &CancellationToken,
    ) -> Result<Outcome, PlaybackError> {
        let destination = session.destination.clone();

        match self.launch_pipeline(&mut session, offset_ms, token).await {
            Ok(Launch::Live) => {
                let position = session.clock.base_position_ms();
                info!(
                    "[{}] Playing {} from {}",
                    destination,
                    session.media.label(),
                    format_duration(position)
                );
                slot.publish_view(&session);
                self.emit(PlaybackEvent::SessionStarted {
                    destination,
                    media: session.media.clone(),
                    position_ms: position,
                });
                *state = Some(session);
                Ok(Outcome::Applied)
            }
            Ok(Launch::Superseded) => {
                debug!("[{}] Start superseded before going live", destination);
                self.discard(session).await;
                Ok(Outcome::Noop(NoopReason::Superseded))
            }
            Err(e) => {
                warn!("[{}] Failed to start {}: {}", destination, session.media.label(), e);
                self.discard(session).await;
                Err(e)
            }
        }
    }

    async fn restart(&self, destination: &DestinationId, kind: RestartKind) -> Result<Outcome, PlaybackError> {
        let result = self.restart_session(destination, kind).await;
        self.prune_slot(destination);
        result
    }

    async fn restart_session(
        &self,
        destination: &DestinationId,
        kind: RestartKind,
    ) -> Result<Outcome, PlaybackError> {
        let Some(slot) = self.slot(destination) else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };
        let token = slot.token();
        let mut state = slot.state.lock().await;
        if token.is_cancelled() {
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }
        let Some(session) = state.as_mut() else {
            return Ok(Outcome::Noop(NoopReason::NoActiveSession));
        };

        let current = session.clock.now();
        let target = match kind {
            RestartKind::Resume if !session.is_paused() => {
                return Ok(Outcome::Noop(NoopReason::NotPaused));
            }
            RestartKind::Resume => session.clock.base_position_ms(),
            RestartKind::SeekTo(target) => session.clock.clamp(target),
            RestartKind::Forward(amount) => session.clock.clamp(current.saturating_add(amount)),
            RestartKind::Back(amount) => session.clock.clamp(current.saturating_sub(amount)),
            RestartKind::Volume(volume) => {
                session.volume = volume;
                if session.is_paused() {
                    slot.publish_view(session);
                    self.emit(PlaybackEvent::VolumeChanged {
                        destination: destination.clone(),
                        volume,
                    });
                    return Ok(Outcome::Applied);
                }
                current
            }
        };

        session.transitioning = true;
        session.phase = match kind {
            RestartKind::SeekTo(_) | RestartKind::Forward(_) | RestartKind::Back(_) => SessionPhase::Seeking,
            _ => SessionPhase::Transitioning,
        };
        session.clock.freeze();
        session.clock.rebase(target);
        slot.publish_view(session);

        let killed = self.shut_pipeline(session).await;
        if !self.wait_kill_grace(killed, &token).await {
            return Ok(Outcome::Noop(NoopReason::Superseded));
        }

        match self.launch_pipeline(session, target, &token).await {
            Ok(Launch::Live) => {
                slot.publish_view(session);
                debug!("[{}] Restarted at {}", destination, format_duration(target));
                self.emit(match kind {
                    RestartKind::Resume => PlaybackEvent::Resumed {
                        destination: destination.clone(),
                        position_ms: target,
                    },
                    RestartKind::Volume(volume) => PlaybackEvent::VolumeChanged {
                        destination: destination.clone(),
                        volume,
                    },
                    _ => PlaybackEvent::Seeked {
                        destination: destination.clone(),
                        position_ms: target,
                    },
                });
                Ok(Outcome::Applied)
            }
            Ok(Launch::Superseded) => {
                // Left without a pipeline; the start/stop that cancelled us ends it.
                debug!("[{}] Restart superseded", destination);
                Ok(Outcome::Noop(NoopReason::Superseded))
            }
            Err(e) => {
                if let Some(session) = state.take() {
                    slot.clear_view();
                    self.end_session(session, EndReason::Failed, Some(e.to_string()), true)
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Acquire then spawn, wiring the output into the transport.
    /// The clock is started at spawn time.
    async fn launch_pipeline(
        &self,
        session: &mut PlaybackSession,
        offset_ms: u64,
        token: &CancellationToken,
    ) -> Result<Launch, PlaybackError> {
        let input = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Launch::Superseded),
            input = session.acquire_input() => input?,
        };

        let options = TranscodeOptions::from_config(&self.inner.settings.stream, session.volume, offset_ms);
        let spawned = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Launch::Superseded),
            spawned = self.inner.collab.transcoder.spawn(&input, &options) => spawned?,
        };

        if token.is_cancelled() {
            spawned.handle.kill().await;
            return Ok(Launch::Superseded);
        }

        let id = self.inner.pipeline_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let gate = OutputGate::new();
        let reader = PipelineReader::new(spawned.output, gate.clone(), session.started_publishing.clone());

        session.clock.start_at(offset_ms, Instant::now());
        let pump = self.spawn_pump(session.destination.clone(), id, Box::new(reader), spawned.handle.clone());
        session.pipeline = Some(ActivePipeline {
            id,
            handle: spawned.handle,
            gate,
            pump,
        });
        session.transitioning = false;
        session.phase = SessionPhase::Playing;
        Ok(Launch::Live)
    }

    fn spawn_pump(
        &self,
        destination: DestinationId,
        pipeline: u64,
        reader: crate::stream::ByteStream,
        handle: ProcessHandle,
    ) -> JoinHandle<()> {
        let transport = self.inner.collab.transport.clone();
        let exits = self.inner.exits.clone();
        let mode = self.inner.settings.stream.mode;

        tokio::spawn(async move {
            let publish = transport.publish(&destination, reader, mode).await;
            let exit = match &publish {
                Ok(()) => handle.wait().await,
                // The transport gave up; the process has nowhere to write.
                Err(_) => handle.kill().await,
            };
            let _ = exits.send(PipelineExit {
                destination,
                pipeline,
                exit,
                publish,
            });
        })
    }

    /// Cuts the current pipeline off the transport and kills it, waiting for
    /// confirmation. Returns whether there was a pipeline to kill.
    ///
    /// The pipeline's pump has finished its publish by the time this returns,
    /// so it can never touch the transport after its successor starts.
    async fn shut_pipeline(&self, session: &mut PlaybackSession) -> bool {
        let Some(mut pipeline) = session.pipeline.take() else {
            return false;
        };

        pipeline.gate.close();
        let exit = pipeline.handle.kill().await;
        if exit.is_failure() {
            warn!(
                "[{}] Pipeline {} (pid {:?}) had already failed: {:?}",
                session.destination,
                pipeline.id,
                pipeline.handle.id(),
                exit
            );
        } else {
            debug!(
                "[{}] Pipeline {} (pid {:?}) stopped ({:?})",
                session.destination,
                pipeline.id,
                pipeline.handle.id(),
                exit
            );
        }

        if let Err(e) = self.inner.collab.transport.stop(&session.destination).await {
            warn!("[{}] Transport stop failed: {}", session.destination, e);
        }

        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pipeline.pump)
            .await
            .is_err()
        {
            warn!(
                "[{}] Pump of pipeline {} did not drain, aborting it",
                session.destination, pipeline.id
            );
            pipeline.pump.abort();
        }
        true
    }

    /// Tears down a session that never went live. Nothing is persisted.
    async fn discard(&self, mut session: PlaybackSession) {
        session.transitioning = true;
        self.shut_pipeline(&mut session).await;
        session.remote.release().await;
        if let Err(e) = self.inner.collab.transport.leave(&session.destination).await {
            warn!("[{}] Transport leave failed: {}", session.destination, e);
        }
    }

    /// kill, release, persist, leave, announce. Returns whether a pipeline was killed.
    async fn end_session(
        &self,
        mut session: PlaybackSession,
        reason: EndReason,
        error: Option<String>,
        leave: bool,
    ) -> bool {
        session.transitioning = true;
        let position = session.clock.freeze();
        let killed = self.shut_pipeline(&mut session).await;
        session.remote.release().await;
        self.record_final_position(&session, position, &reason);

        if leave {
            if let Err(e) = self.inner.collab.transport.leave(&session.destination).await {
                warn!("[{}] Transport leave failed: {}", session.destination, e);
            }
        }

        info!(
            "[{}] Session for {} ended ({:?}) at {}",
            session.destination,
            session.media.label(),
            reason,
            format_duration(position)
        );
        self.emit(PlaybackEvent::SessionEnded {
            destination: session.destination.clone(),
            media_id: session.media.id.clone(),
            position_ms: position,
            reason,
            error,
        });
        killed
    }

    /// Sleeps `kill_grace` after a confirmed kill so the backend sees the old
    /// session go away. False when a newer operation cancelled the wait.
    async fn wait_kill_grace(&self, killed: bool, token: &CancellationToken) -> bool {
        let grace = self.inner.settings.kill_grace;
        if !killed || grace.is_zero() {
            return true;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(grace) => true,
        }
    }

    fn record_final_position(&self, session: &PlaybackSession, position: u64, reason: &EndReason) {
        let media = &session.media;
        if *reason == EndReason::Finished && is_completed(position, media.duration_ms) {
            if self.inner.resume.clear(&media.id) {
                debug!("[{}] {} watched to the end", session.destination, media.label());
            }
            return;
        }
        if session.has_started_publishing() {
            self.inner.resume.put(&media.id, position, &media.label());
        }
    }

    async fn handle_exit(&self, exit: PipelineExit) {
        let Some(slot) = self.slot(&exit.destination) else {
            return;
        };
        let mut state = slot.state.lock().await;
        let Some(session) = state.as_ref() else {
            debug!("[{}] Exit of pipeline {} after session end", exit.destination, exit.pipeline);
            return;
        };
        if session.transitioning || session.pipeline_id() != Some(exit.pipeline) {
            debug!("[{}] Ignoring exit of superseded pipeline {}", exit.destination, exit.pipeline);
            return;
        }

        let (reason, error) = match (exit.exit, exit.publish) {
            (_, Err(e)) => {
                error!("[{}] Publishing failed: {}", exit.destination, e);
                (EndReason::Failed, Some(e.to_string()))
            }
            (ProcessExit::Completed, Ok(())) => (EndReason::Finished, None),
            (ProcessExit::Failed { code, diagnostics }, Ok(())) => {
                let err = PlaybackError::ProcessAbnormalExit { code, diagnostics };
                error!("[{}] {}", exit.destination, err);
                (EndReason::Failed, Some(err.to_string()))
            }
            (ProcessExit::Killed, Ok(())) => {
                debug!("[{}] Pipeline {} killed outside a transition", exit.destination, exit.pipeline);
                (EndReason::Stopped, None)
            }
        };

        if let Some(session) = state.take() {
            slot.clear_view();
            self.end_session(session, reason, error, true).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RestartKind {
    Resume,
    SeekTo(u64),
    Forward(u64),
    Back(u64),
    Volume(u16),
}

/// Within the last 2% of the item, capped at one minute.
fn is_completed(position_ms: u64, duration_ms: u64) -> bool {
    if duration_ms == 0 {
        return false;
    }
    let window = ((duration_ms as f64 * COMPLETION_FRACTION) as u64).min(COMPLETION_WINDOW_MS);
    position_ms.saturating_add(window) >= duration_ms
}

async fn watch_exits(inner: Weak<Inner>, exits: flume::Receiver<PipelineExit>) {
    while let Ok(exit) = exits.recv_async().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };
        tokio::spawn(async move {
            let destination = exit.destination.clone();
            manager.handle_exit(exit).await;
            manager.prune_slot(&destination);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeResolver, FakeTranscoder, FakeTransport, episode};

    struct Harness {
        manager: SessionManager,
        backend: Arc<FakeBackend>,
        transcoder: Arc<FakeTranscoder>,
        transport: Arc<FakeTransport>,
        orphans: Arc<OrphanTracker>,
    }

    fn harness() -> Harness {
        harness_with_grace(Duration::ZERO)
    }

    fn harness_with_grace(kill_grace: Duration) -> Harness {
        let backend = Arc::new(FakeBackend::new());
        let transcoder = Arc::new(FakeTranscoder::new());
        let transport = Arc::new(FakeTransport::new());
        let orphans = Arc::new(OrphanTracker::in_memory());
        let manager = SessionManager::new(
            Collaborators {
                backend: backend.clone(),
                resolver: Arc::new(FakeResolver::new()),
                transcoder: transcoder.clone(),
                transport: transport.clone(),
            },
            Arc::new(ResumeStore::in_memory(Duration::from_secs(7 * 86_400), 30_000)),
            orphans.clone(),
            ManagerSettings {
                stream: StreamConfig::default(),
                kill_grace,
            },
        );
        Harness {
            manager,
            backend,
            transcoder,
            transport,
            orphans,
        }
    }

    fn dest() -> DestinationId {
        DestinationId::from("guild-1")
    }

    fn library(id: &str, offset: Option<u64>) -> StartRequest {
        StartRequest {
            destination: dest(),
            channel: ChannelId::from("voice-1"),
            source: SourceRequest::Library {
                media_id: MediaId::from(id),
            },
            start_offset_ms: offset,
            volume: None,
        }
    }

    async fn until_publishing(manager: &SessionManager) {
        for _ in 0..100 {
            if manager
                .view(&dest())
                .is_some_and(|v| v.has_started_publishing())
            {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("pipeline never delivered output");
    }

    /// Exit handlers of killed pipelines may briefly hold a slot.
    async fn until_no_slots(manager: &SessionManager) {
        for _ in 0..100 {
            if manager.inner.slots.is_empty() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("slot was never released");
    }

    async fn next_end(events: &mut broadcast::Receiver<PlaybackEvent>) -> PlaybackEvent {
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, PlaybackEvent::SessionEnded { .. }) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_records_position_and_resume_respawns_there() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));

        let outcome = h.manager.start(library("ep1", Some(0))).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        until_publishing(&h.manager).await;

        tokio::time::advance(Duration::from_secs(65)).await;
        assert_eq!(h.manager.pause(&dest()).await.unwrap(), Outcome::Applied);

        let progress = h.manager.get_progress(&dest());
        assert_eq!(progress.current_ms, 65_000);
        assert_eq!(progress.total_ms, 1_800_000);
        assert_eq!(h.manager.resume_store().get(&MediaId::from("ep1")), Some(65_000));
        assert_eq!(h.transcoder.live_count(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 65_000);

        assert_eq!(h.manager.resume(&dest()).await.unwrap(), Outcome::Applied);
        assert_eq!(h.transcoder.offsets(), vec![0, 65_000]);
        assert_eq!(h.transcoder.live_count(), 1);
        assert_eq!(h.backend.resolve_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_pause_and_resume_are_noops() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        assert_eq!(
            h.manager.resume(&dest()).await.unwrap(),
            Outcome::Noop(NoopReason::NotPaused)
        );
        h.manager.pause(&dest()).await.unwrap();
        assert_eq!(
            h.manager.pause(&dest()).await.unwrap(),
            Outcome::Noop(NoopReason::AlreadyPaused)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn seek_lands_on_target_and_clamps() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 600_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        h.manager.seek(&dest(), 120_000).await.unwrap();
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 120_000);

        h.manager.seek(&dest(), 9_999_999).await.unwrap();
        assert_eq!(h.transcoder.offsets().last(), Some(&600_000));
        assert_eq!(h.transcoder.live_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_seeks_leave_one_pipeline_at_the_last_target() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        let d = dest();
        let (a, b) = tokio::join!(h.manager.seek(&d, 300_000), h.manager.seek(&d, 900_000));
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(h.transcoder.live_count(), 1);
        assert_eq!(h.transcoder.live_offsets(), vec![900_000]);
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 900_000);
    }

    #[tokio::test(start_paused = true)]
    async fn volume_change_keeps_position() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        tokio::time::advance(Duration::from_secs(42)).await;

        h.manager.set_volume(&dest(), 250).await.unwrap();

        assert_eq!(h.manager.get_progress(&dest()).current_ms, 42_000);
        assert_eq!(h.transcoder.volumes().last(), Some(&MAX_VOLUME));
        assert_eq!(h.transcoder.offsets().last(), Some(&42_000));
    }

    #[tokio::test(start_paused = true)]
    async fn volume_change_while_paused_waits_for_resume() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        h.manager.pause(&dest()).await.unwrap();

        h.manager.set_volume(&dest(), 40).await.unwrap();
        assert_eq!(h.transcoder.spawn_count(), 1);

        h.manager.resume(&dest()).await.unwrap();
        assert_eq!(h.transcoder.volumes(), vec![100, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_forward_and_rewind_are_relative() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(100_000))).await.unwrap();

        h.manager.fast_forward(&dest(), DEFAULT_JUMP_MS).await.unwrap();
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 130_000);

        h.manager.rewind(&dest(), 200_000).await.unwrap();
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_jumps_clamp_to_either_end() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(100_000))).await.unwrap();

        h.manager.fast_forward(&dest(), u64::MAX).await.unwrap();
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 1_800_000);
        assert_eq!(h.transcoder.offsets().last(), Some(&1_800_000));

        h.manager.rewind(&dest(), u64::MAX).await.unwrap();
        assert_eq!(h.manager.get_progress(&dest()).current_ms, 0);
        assert_eq!(h.transcoder.live_offsets(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_and_replacing_start_wait_out_kill_grace() {
        let grace = Duration::from_millis(500);
        let h = harness_with_grace(grace);
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.add(episode("ep2", "show", 1, 2, 1_800_000));
        h.backend.add(episode("ep9", "other", 1, 1, 1_800_000));

        let began = Instant::now();
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        assert!(began.elapsed() < grace, "nothing was killed, so no grace");

        let began = Instant::now();
        assert_eq!(h.manager.skip(&dest()).await.unwrap(), Outcome::Applied);
        assert!(began.elapsed() >= grace);
        assert_eq!(h.manager.view(&dest()).unwrap().media.id, MediaId::from("ep2"));

        let began = Instant::now();
        assert_eq!(h.manager.start(library("ep9", Some(0))).await.unwrap(), Outcome::Applied);
        assert!(began.elapsed() >= grace);
        assert_eq!(h.transcoder.live_count(), 1);
        assert_eq!(h.manager.view(&dest()).unwrap().media.id, MediaId::from("ep9"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_kill_grace_supersedes_skip() {
        let h = harness_with_grace(Duration::from_secs(2));
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.add(episode("ep2", "show", 1, 2, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        let manager = h.manager.clone();
        let skipping = tokio::spawn(async move { manager.skip(&dest()).await });
        while h.transcoder.live_count() == 1 {
            tokio::task::yield_now().await;
        }

        h.manager.stop(&dest()).await.unwrap();
        assert_eq!(
            skipping.await.unwrap().unwrap(),
            Outcome::Noop(NoopReason::Superseded)
        );
        assert_eq!(h.transcoder.spawn_count(), 1);
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.transport.leaves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_the_transport_once_and_resume_publishes_again() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        until_publishing(&h.manager).await;

        h.manager.pause(&dest()).await.unwrap();
        h.manager.pause(&dest()).await.unwrap();
        assert_eq!(h.transport.stops(), 1);
        assert_eq!(h.transport.publishes(), 1);

        h.manager.resume(&dest()).await.unwrap();
        for _ in 0..100 {
            if h.transport.publishes() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(h.transport.publishes(), 2);
        assert_eq!(h.transport.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_never_publish_two_pipelines_at_once() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        for target in [60_000, 120_000, 180_000, 240_000] {
            h.manager.seek(&dest(), target).await.unwrap();
        }
        h.manager.set_volume(&dest(), 50).await.unwrap();
        h.manager.pause(&dest()).await.unwrap();
        h.manager.resume(&dest()).await.unwrap();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.transcoder.spawn_count(), 7);
        assert_eq!(h.transport.peak_publishing(), 1);
        assert_eq!(h.transport.stops(), 6);
    }

    #[tokio::test]
    async fn join_failure_surfaces_before_anything_spawns() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.transport.fail_next_join();

        let err = h.manager.start(library("ep1", Some(0))).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Transport(_)));
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.backend.resolve_count(), 0);
        assert_eq!(h.transcoder.spawn_count(), 0);
        assert_eq!(h.transport.publishes(), 0);
        assert!(h.orphans.is_empty());
        assert!(h.manager.inner.slots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_ends_session_and_kills_pipeline() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.transport.fail_next_publish();
        let mut events = h.manager.subscribe();

        assert_eq!(h.manager.start(library("ep1", Some(0))).await.unwrap(), Outcome::Applied);

        match next_end(&mut events).await {
            PlaybackEvent::SessionEnded { reason, error, .. } => {
                assert_eq!(reason, EndReason::Failed);
                assert!(error.unwrap().contains("stream rejected"));
            }
            _ => unreachable!(),
        }
        assert_eq!(h.transcoder.live_count(), 0);
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.transport.leaves(), 1);
        assert_eq!(h.backend.terminated().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_sessions_release_their_slot() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));

        h.manager.start(library("ep1", Some(0))).await.unwrap();
        assert_eq!(h.manager.inner.slots.len(), 1);
        h.manager.stop(&dest()).await.unwrap();
        until_no_slots(&h.manager).await;

        h.transcoder.fail_next_spawn();
        h.manager.start(library("ep1", Some(0))).await.unwrap_err();
        assert!(h.manager.inner.slots.is_empty());

        let mut events = h.manager.subscribe();
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        h.transcoder.finish_last(ProcessExit::Completed);
        next_end(&mut events).await;
        until_no_slots(&h.manager).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_twice_is_silent() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        assert_eq!(h.manager.stop(&dest()).await.unwrap(), Outcome::Applied);
        assert_eq!(
            h.manager.stop(&dest()).await.unwrap(),
            Outcome::Noop(NoopReason::NoActiveSession)
        );
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.manager.get_progress(&dest()), Progress::default());
        assert_eq!(h.transcoder.live_count(), 0);
        assert!(h.orphans.is_empty());
        assert_eq!(h.transport.leaves(), 1);
    }

    #[tokio::test]
    async fn operations_without_session_are_noops() {
        let h = harness();
        let none = Outcome::Noop(NoopReason::NoActiveSession);
        assert_eq!(h.manager.pause(&dest()).await.unwrap(), none);
        assert_eq!(h.manager.resume(&dest()).await.unwrap(), none);
        assert_eq!(h.manager.seek(&dest(), 5).await.unwrap(), none);
        assert_eq!(h.manager.skip(&dest()).await.unwrap(), none);
        assert_eq!(h.manager.stop(&dest()).await.unwrap(), none);
    }

    #[tokio::test(start_paused = true)]
    async fn short_sessions_do_not_touch_resume_store() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.resume_store().put(&MediaId::from("ep1"), 400_000, "ep1");

        h.manager.start(library("ep1", Some(0))).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        h.manager.stop(&dest()).await.unwrap();

        assert_eq!(h.manager.resume_store().get(&MediaId::from("ep1")), Some(400_000));
    }

    #[tokio::test(start_paused = true)]
    async fn start_continues_from_resume_point() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.resume_store().put(&MediaId::from("ep1"), 400_000, "ep1");

        h.manager.start(library("ep1", None)).await.unwrap();
        assert_eq!(h.transcoder.offsets(), vec![400_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_replaces_existing_session() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.add(episode("ep9", "other", 1, 1, 1_800_000));
        let mut events = h.manager.subscribe();

        h.manager.start(library("ep1", Some(0))).await.unwrap();
        h.manager.start(library("ep9", Some(0))).await.unwrap();

        match next_end(&mut events).await {
            PlaybackEvent::SessionEnded { media_id, reason, .. } => {
                assert_eq!(media_id, MediaId::from("ep1"));
                assert_eq!(reason, EndReason::Replaced);
            }
            _ => unreachable!(),
        }
        assert_eq!(h.manager.active_count(), 1);
        assert_eq!(h.transcoder.live_count(), 1);
        assert_eq!(h.manager.view(&dest()).unwrap().media.id, MediaId::from("ep9"));
    }

    #[tokio::test]
    async fn failed_acquire_registers_nothing() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.fail_resolve(PlaybackError::UpstreamUnavailable("503".into()));

        let err = h.manager.start(library("ep1", Some(0))).await.unwrap_err();
        assert!(matches!(err, PlaybackError::UpstreamUnavailable(_)));
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.transcoder.spawn_count(), 0);
        assert_eq!(h.transport.leaves(), 1);
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_and_releases_backend() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.transcoder.fail_next_spawn();

        let err = h.manager.start(library("ep1", Some(0))).await.unwrap_err();
        assert!(matches!(err, PlaybackError::ProcessSpawnFailure(_)));
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.backend.terminated().len(), 1);
        assert!(h.orphans.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_exit_tears_down_and_keeps_resume_point() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        let mut events = h.manager.subscribe();
        h.manager.start(library("ep1", Some(0))).await.unwrap();
        until_publishing(&h.manager).await;
        tokio::time::advance(Duration::from_secs(90)).await;

        h.transcoder.finish_last(ProcessExit::Failed {
            code: Some(1),
            diagnostics: "Connection reset by peer".into(),
        });

        match next_end(&mut events).await {
            PlaybackEvent::SessionEnded { reason, error, .. } => {
                assert_eq!(reason, EndReason::Failed);
                assert!(error.unwrap().contains("Connection reset"));
            }
            _ => unreachable!(),
        }
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.manager.resume_store().get(&MediaId::from("ep1")), Some(90_000));
    }

    #[tokio::test(start_paused = true)]
    async fn natural_end_near_credits_clears_resume_point() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.resume_store().put(&MediaId::from("ep1"), 1_790_000, "ep1");
        let mut events = h.manager.subscribe();

        h.manager.start(library("ep1", None)).await.unwrap();
        until_publishing(&h.manager).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        h.transcoder.finish_last(ProcessExit::Completed);

        match next_end(&mut events).await {
            PlaybackEvent::SessionEnded { reason, .. } => assert_eq!(reason, EndReason::Finished),
            _ => unreachable!(),
        }
        assert_eq!(h.manager.resume_store().get(&MediaId::from("ep1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn killed_pipeline_exit_does_not_end_session() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.manager.start(library("ep1", Some(0))).await.unwrap();

        for target in [60_000, 120_000, 180_000] {
            h.manager.seek(&dest(), target).await.unwrap();
        }
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        let view = h.manager.view(&dest()).unwrap();
        assert_eq!(view.phase, SessionPhase::Playing);
        assert_eq!(h.transcoder.live_offsets(), vec![180_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_moves_to_next_episode_in_place() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.add(episode("ep2", "show", 1, 2, 1_800_000));

        h.manager.start(library("ep1", Some(0))).await.unwrap();
        assert_eq!(h.manager.skip(&dest()).await.unwrap(), Outcome::Applied);

        let view = h.manager.view(&dest()).unwrap();
        assert_eq!(view.media.id, MediaId::from("ep2"));
        assert_eq!(h.transport.leaves(), 0);
        assert_eq!(h.transport.joins(), 1);
        assert_eq!(h.transcoder.live_count(), 1);

        assert!(matches!(
            h.manager.skip(&dest()).await,
            Err(PlaybackError::NoNextItem)
        ));
        assert_eq!(h.manager.view(&dest()).unwrap().media.id, MediaId::from("ep2"));
    }

    #[tokio::test(start_paused = true)]
    async fn direct_urls_skip_the_backend() {
        let h = harness();
        let req = StartRequest {
            source: SourceRequest::Url {
                url: "https://cdn.example/live.m3u8".into(),
                title: Some("Live".into()),
            },
            ..library("unused", Some(0))
        };

        h.manager.start(req).await.unwrap();
        let view = h.manager.view(&dest()).unwrap();
        assert_eq!(&*view.media.id, "url:https://cdn.example/live.m3u8");
        assert_eq!(h.backend.resolve_count(), 0);
        assert_eq!(h.transcoder.urls(), vec!["https://cdn.example/live.m3u8".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn external_sources_resolve_once() {
        let h = harness();
        let req = StartRequest {
            source: SourceRequest::External {
                url: "https://youtu.be/abc".into(),
            },
            ..library("unused", Some(0))
        };

        h.manager.start(req).await.unwrap();
        h.manager.seek(&dest(), 30_000).await.unwrap();

        assert_eq!(h.transcoder.urls().len(), 2);
        assert!(h.transcoder.urls().iter().all(|u| u == "https://media.example/abc.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preempts_a_pending_start() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.delay_resolve(Duration::from_secs(5));

        let manager = h.manager.clone();
        let starting = tokio::spawn(async move { manager.start(library("ep1", Some(0))).await });
        while h.backend.resolve_count() == 0 {
            tokio::task::yield_now().await;
        }

        h.manager.stop(&dest()).await.unwrap();
        let outcome = starting.await.unwrap().unwrap();

        assert_eq!(outcome, Outcome::Noop(NoopReason::Superseded));
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.transcoder.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_records_every_destination() {
        let h = harness();
        h.backend.add(episode("ep1", "show", 1, 1, 1_800_000));
        h.backend.add(episode("ep2", "show", 1, 2, 1_800_000));

        h.manager.start(library("ep1", Some(100_000))).await.unwrap();
        let mut other = library("ep2", Some(200_000));
        other.destination = DestinationId::from("guild-2");
        h.manager.start(other).await.unwrap();
        until_publishing(&h.manager).await;
        for _ in 0..100 {
            if h.manager
                .view(&DestinationId::from("guild-2"))
                .is_some_and(|v| v.has_started_publishing())
            {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(h.manager.active_count(), 2);

        h.manager.stop_all().await;

        assert_eq!(h.manager.active_count(), 0);
        assert_eq!(h.transcoder.live_count(), 0);
        let resume = h.manager.resume_store();
        assert_eq!(resume.get(&MediaId::from("ep1")), Some(100_000));
        assert_eq!(resume.get(&MediaId::from("ep2")), Some(200_000));
    }

    #[tokio::test]
    async fn empty_source_url_is_rejected() {
        let h = harness();
        let req = StartRequest {
            source: SourceRequest::Url {
                url: "  ".into(),
                title: None,
            },
            ..library("unused", None)
        };
        let err = h.manager.start(req).await.unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidRequest(_)));
        assert!(h.manager.view(&dest()).is_none());
        assert_eq!(h.transport.joins(), 0);
    }

    #[test]
    fn completion_window() {
        assert!(is_completed(1_790_000, 1_800_000));
        assert!(!is_completed(1_700_000, 1_800_000));
        // 2% of 10 minutes is 12 s
        assert!(is_completed(590_000, 600_000));
        assert!(!is_completed(580_000, 600_000));
        assert!(!is_completed(5_000, 0));
    }
}
