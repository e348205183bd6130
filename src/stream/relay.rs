use std::process::Stdio;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ByteStream, StreamTransport};
use crate::{
    common::{ChannelId, DestinationId, PlaybackError},
    configs::{RelayConfig, StreamMode},
};

struct RelaySlot {
    channel: ChannelId,
    publishing: Option<CancellationToken>,
}

/// Pipes each destination's stream into an external relay process
/// (e.g. an ffmpeg pushing SRT/RTMP to the media server behind the channel).
pub struct RelayTransport {
    command: Vec<String>,
    slots: DashMap<DestinationId, RelaySlot>,
}

impl RelayTransport {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            command: config.command.clone(),
            slots: DashMap::new(),
        }
    }

    fn render(&self, destination: &DestinationId, channel: &ChannelId, mode: StreamMode) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{destination}", destination)
                    .replace("{channel}", channel)
                    .replace("{mode}", mode.as_str())
            })
            .collect()
    }
}

#[async_trait]
impl StreamTransport for RelayTransport {
    async fn join(&self, destination: &DestinationId, channel: &ChannelId) -> Result<(), PlaybackError> {
        if self.command.is_empty() {
            return Err(PlaybackError::Transport("relay command is empty".into()));
        }
        info!("[{}] Joined channel {}", destination, channel);
        self.slots.insert(
            destination.clone(),
            RelaySlot {
                channel: channel.clone(),
                publishing: None,
            },
        );
        Ok(())
    }

    async fn publish(
        &self,
        destination: &DestinationId,
        mut stream: ByteStream,
        mode: StreamMode,
    ) -> Result<(), PlaybackError> {
        let token = CancellationToken::new();
        let argv = {
            let mut slot = self
                .slots
                .get_mut(destination)
                .ok_or_else(|| PlaybackError::Transport(format!("{} has not joined a channel", destination)))?;
            if let Some(previous) = slot.publishing.replace(token.clone()) {
                previous.cancel();
            }
            self.render(destination, &slot.channel, mode)
        };

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Transport(format!("failed to start relay {}: {}", argv[0], e)))?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(PlaybackError::Transport("relay stdin not captured".into()));
        };

        debug!("[{}] Publishing via relay pid {:?}", destination, child.id());

        let copied = tokio::select! {
            copied = tokio::io::copy(&mut stream, &mut stdin) => Some(copied),
            _ = token.cancelled() => None,
        };
        drop(stdin);

        let result = match copied {
            Some(Ok(bytes)) => {
                debug!("[{}] Stream ended after {} bytes", destination, bytes);
                tokio::select! {
                    _ = child.wait() => {}
                    _ = token.cancelled() => {}
                }
                Ok(())
            }
            Some(Err(e)) => Err(PlaybackError::Transport(format!("relay write failed: {}", e))),
            None => {
                debug!("[{}] Publish stopped", destination);
                Ok(())
            }
        };

        let _ = child.start_kill();
        let _ = child.wait().await;

        if let Some(mut slot) = self.slots.get_mut(destination) {
            // A cancelled token means stop() or a newer publish already owns the slot.
            if !token.is_cancelled() {
                slot.publishing = None;
            }
        }

        if let Err(e) = &result {
            warn!("[{}] {}", destination, e);
        }
        result
    }

    async fn stop(&self, destination: &DestinationId) -> Result<(), PlaybackError> {
        if let Some(mut slot) = self.slots.get_mut(destination) {
            if let Some(token) = slot.publishing.take() {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn leave(&self, destination: &DestinationId) -> Result<(), PlaybackError> {
        if let Some((_, slot)) = self.slots.remove(destination) {
            if let Some(token) = slot.publishing {
                token.cancel();
            }
            info!("[{}] Left channel {}", destination, slot.channel);
        }
        Ok(())
    }
}
