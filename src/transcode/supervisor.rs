use std::{collections::VecDeque, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
};
use tracing::{debug, info, warn};

use super::{
    options::{TranscodeInput, TranscodeOptions, build_args},
    process::{ProcessExit, ProcessHandle, ProcessMonitor, process_channel},
};
use crate::{common::PlaybackError, configs::TranscoderConfig};

pub type PipelineOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly spawned transcoder: its encoded output and the handle that owns it.
pub struct SpawnedPipeline {
    pub handle: ProcessHandle,
    pub output: PipelineOutput,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn spawn(
        &self,
        input: &TranscodeInput,
        options: &TranscodeOptions,
    ) -> Result<SpawnedPipeline, PlaybackError>;
}

pub struct FfmpegSupervisor {
    binary: String,
    kill_timeout: Duration,
    diagnostic_lines: usize,
}

impl FfmpegSupervisor {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            kill_timeout: Duration::from_millis(config.kill_timeout_ms),
            diagnostic_lines: config.diagnostic_lines.max(1),
        }
    }

    /// Spawns `command` with piped output and hands the child to a waiter task.
    pub fn spawn_command(&self, mut command: Command) -> Result<SpawnedPipeline, PlaybackError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| PlaybackError::ProcessSpawnFailure(format!("{}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlaybackError::ProcessSpawnFailure("stdout not captured".into()))?;
        let stderr = child.stderr.take();

        let pid = child.id();
        let (handle, monitor) = process_channel(pid, self.kill_timeout);

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(self.diagnostic_lines)));
        let stderr_task = stderr.map(|stderr| {
            let tail = tail.clone();
            let keep = self.diagnostic_lines;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "plexcast::transcode::ffmpeg", "[{:?}] {}", pid, line);
                    let mut tail = tail.lock();
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        });

        tokio::spawn(watch_child(child, monitor, pid, tail, stderr_task));

        Ok(SpawnedPipeline {
            handle,
            output: Box::new(stdout),
        })
    }
}

async fn watch_child(
    mut child: Child,
    mut monitor: ProcessMonitor,
    pid: Option<u32>,
    tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = monitor.kill_requested() => None,
    };

    let exit = match status {
        None => {
            if let Err(e) = child.start_kill() {
                debug!("Process {:?} already gone: {}", pid, e);
            }
            let _ = child.wait().await;
            ProcessExit::Killed
        }
        Some(Ok(status)) if status.success() => ProcessExit::Completed,
        Some(Ok(status)) => {
            // Let stderr drain so the tail is complete.
            if let Some(task) = stderr_task {
                let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
            }
            ProcessExit::Failed {
                code: status.code(),
                diagnostics: tail.lock().iter().cloned().collect::<Vec<_>>().join("\n"),
            }
        }
        Some(Err(e)) => ProcessExit::Failed {
            code: None,
            diagnostics: e.to_string(),
        },
    };

    match monitor.report(exit) {
        ProcessExit::Completed => info!("Transcoder {:?} finished", pid),
        ProcessExit::Killed => debug!("Transcoder {:?} terminated on request", pid),
        ProcessExit::Failed { code, .. } => warn!("Transcoder {:?} exited with {:?}", pid, code),
    }
}

#[async_trait]
impl Transcoder for FfmpegSupervisor {
    async fn spawn(
        &self,
        input: &TranscodeInput,
        options: &TranscodeOptions,
    ) -> Result<SpawnedPipeline, PlaybackError> {
        let args = build_args(input, options);
        debug!(
            "Spawning {} at {}ms (volume {}%)",
            self.binary, options.start_offset_ms, options.volume_percent
        );

        let mut command = Command::new(&self.binary);
        command.args(&args);
        self.spawn_command(command)
    }
}
