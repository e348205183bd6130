//! In-memory collaborators for exercising the playback core.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{io::AsyncWriteExt, sync::oneshot};

use crate::{
    backend::{Direction, MediaBackend, MediaHandle, MediaKind, PlayableStream, step_episode},
    common::{BackendSessionId, ChannelId, DestinationId, MediaId, PlaybackError},
    configs::StreamMode,
    resolver::{MediaResolver, ResolvedMedia},
    stream::{ByteStream, StreamTransport},
    transcode::{ProcessExit, SpawnedPipeline, TranscodeInput, TranscodeOptions, Transcoder, process_channel},
};

pub fn episode(id: &str, series: &str, season: u32, number: u32, duration_ms: u64) -> MediaHandle {
    MediaHandle {
        series_id: Some(series.to_string()),
        show_title: Some(series.to_string()),
        season: Some(season),
        episode: Some(number),
        ..MediaHandle::new(id, format!("Episode {}", number), MediaKind::Episode).with_duration(duration_ms)
    }
}

#[derive(Default)]
pub struct FakeBackend {
    items: Mutex<HashMap<MediaId, MediaHandle>>,
    resolve_error: Mutex<Option<PlaybackError>>,
    resolve_delay: Mutex<Option<Duration>>,
    failing_terminations: Mutex<HashSet<String>>,
    terminated: Mutex<Vec<BackendSessionId>>,
    resolves: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: MediaHandle) {
        self.items.lock().insert(item.id.clone(), item);
    }

    /// The next `resolve_playable` fails with `err`.
    pub fn fail_resolve(&self, err: PlaybackError) {
        *self.resolve_error.lock() = Some(err);
    }

    pub fn delay_resolve(&self, delay: Duration) {
        *self.resolve_delay.lock() = Some(delay);
    }

    pub fn fail_termination_of(&self, id: &str) {
        self.failing_terminations.lock().insert(id.to_string());
    }

    /// Every termination attempt, successful or not.
    pub fn terminated(&self) -> Vec<BackendSessionId> {
        self.terminated.lock().clone()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn describe(&self, media: &MediaId) -> Result<MediaHandle, PlaybackError> {
        self.items
            .lock()
            .get(media)
            .cloned()
            .ok_or_else(|| PlaybackError::NotPlayable(format!("unknown item {}", media)))
    }

    async fn resolve_playable(
        &self,
        media: &MediaId,
        session: &BackendSessionId,
    ) -> Result<PlayableStream, PlaybackError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let delay = *self.resolve_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.resolve_error.lock().take() {
            return Err(err);
        }
        Ok(PlayableStream {
            url: format!("http://backend.test/{}?session={}", media, session),
            container: Some("mkv".into()),
            ..Default::default()
        })
    }

    async fn terminate_session(&self, session: &BackendSessionId) -> Result<(), PlaybackError> {
        self.terminated.lock().push(session.clone());
        if self.failing_terminations.lock().contains(&session.0) {
            return Err(PlaybackError::UpstreamUnavailable("backend timed out".into()));
        }
        Ok(())
    }

    async fn adjacent_item(
        &self,
        media: &MediaHandle,
        direction: Direction,
    ) -> Result<Option<MediaHandle>, PlaybackError> {
        let siblings: Vec<MediaHandle> = self
            .items
            .lock()
            .values()
            .filter(|item| item.series_id.is_some() && item.series_id == media.series_id)
            .cloned()
            .collect();
        Ok(step_episode(siblings, &media.id, direction))
    }
}

#[derive(Default)]
pub struct FakeResolver;

impl FakeResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve_info(&self, url: &str) -> Result<ResolvedMedia, PlaybackError> {
        let slug = url.rsplit('/').next().unwrap_or("media");
        Ok(ResolvedMedia {
            title: format!("Resolved {}", slug),
            duration_ms: 600_000,
            media_url: format!("https://media.example/{}.mp4", slug),
            audio_url: None,
            headers: Vec::new(),
        })
    }
}

pub struct SpawnRecord {
    pub url: String,
    pub offset_ms: u64,
    pub volume: u16,
    alive: Arc<AtomicBool>,
    finish: Mutex<Option<oneshot::Sender<ProcessExit>>>,
}

impl SpawnRecord {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Spawns pretend processes: each writes one chunk, then idles until killed
/// or finished through [`FakeTranscoder::finish_last`].
#[derive(Default)]
pub struct FakeTranscoder {
    spawns: Mutex<Vec<Arc<SpawnRecord>>>,
    fail_next: AtomicBool,
    pids: AtomicU32,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_spawn(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().len()
    }

    pub fn live_count(&self) -> usize {
        self.spawns.lock().iter().filter(|s| s.is_alive()).count()
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.spawns.lock().iter().map(|s| s.offset_ms).collect()
    }

    pub fn live_offsets(&self) -> Vec<u64> {
        self.spawns
            .lock()
            .iter()
            .filter(|s| s.is_alive())
            .map(|s| s.offset_ms)
            .collect()
    }

    pub fn volumes(&self) -> Vec<u16> {
        self.spawns.lock().iter().map(|s| s.volume).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.spawns.lock().iter().map(|s| s.url.clone()).collect()
    }

    /// Makes the most recent process exit on its own with `exit`.
    pub fn finish_last(&self, exit: ProcessExit) {
        let last = self.spawns.lock().last().cloned();
        if let Some(tx) = last.and_then(|s| s.finish.lock().take()) {
            let _ = tx.send(exit);
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn spawn(
        &self,
        input: &TranscodeInput,
        options: &TranscodeOptions,
    ) -> Result<SpawnedPipeline, PlaybackError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::ProcessSpawnFailure("ffmpeg: not found".into()));
        }

        let pid = self.pids.fetch_add(1, Ordering::SeqCst) + 1000;
        let (handle, mut monitor) = process_channel(Some(pid), Duration::from_secs(1));
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let (finish_tx, finish_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));

        self.spawns.lock().push(Arc::new(SpawnRecord {
            url: input.url.clone(),
            offset_ms: options.start_offset_ms,
            volume: options.volume_percent,
            alive: alive.clone(),
            finish: Mutex::new(Some(finish_tx)),
        }));

        tokio::spawn(async move {
            let _ = writer.write_all(b"\x47fake-ts-packet").await;
            let exit = tokio::select! {
                _ = monitor.kill_requested() => ProcessExit::Killed,
                exit = finish_rx => exit.unwrap_or(ProcessExit::Completed),
            };
            drop(writer);
            alive.store(false, Ordering::SeqCst);
            monitor.report(exit);
        });

        Ok(SpawnedPipeline {
            handle,
            output: Box::new(reader),
        })
    }
}

/// Drains published streams and counts calls.
#[derive(Default)]
pub struct FakeTransport {
    joins: AtomicUsize,
    leaves: AtomicUsize,
    stops: AtomicUsize,
    publishes: AtomicUsize,
    publishing: AtomicUsize,
    peak_publishing: AtomicUsize,
    fail_join: AtomicBool,
    fail_publish: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Most publishes ever in flight at the same time.
    pub fn peak_publishing(&self) -> usize {
        self.peak_publishing.load(Ordering::SeqCst)
    }

    /// The next join is refused.
    pub fn fail_next_join(&self) {
        self.fail_join.store(true, Ordering::SeqCst);
    }

    /// The next publish gives up before reading anything.
    pub fn fail_next_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn join(&self, _destination: &DestinationId, _channel: &ChannelId) -> Result<(), PlaybackError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.fail_join.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::Transport("channel is full".into()));
        }
        Ok(())
    }

    async fn publish(
        &self,
        _destination: &DestinationId,
        mut stream: ByteStream,
        _mode: StreamMode,
    ) -> Result<(), PlaybackError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::Transport("stream rejected by relay".into()));
        }

        let live = self.publishing.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_publishing.fetch_max(live, Ordering::SeqCst);
        let copied = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
        self.publishing.fetch_sub(1, Ordering::SeqCst);

        copied
            .map(|_| ())
            .map_err(|e| PlaybackError::Transport(e.to_string()))
    }

    async fn stop(&self, _destination: &DestinationId) -> Result<(), PlaybackError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn leave(&self, _destination: &DestinationId) -> Result<(), PlaybackError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
