//! Real-time streaming transport the encoded output is published into.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{
    common::{ChannelId, DestinationId, PlaybackError},
    configs::StreamMode,
};

pub mod relay;

pub use relay::RelayTransport;

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn join(&self, destination: &DestinationId, channel: &ChannelId) -> Result<(), PlaybackError>;

    /// Publishes until `stream` ends or `stop` is called for the destination.
    /// Backpressure from the transport propagates into `stream`.
    async fn publish(
        &self,
        destination: &DestinationId,
        stream: ByteStream,
        mode: StreamMode,
    ) -> Result<(), PlaybackError>;

    async fn stop(&self, destination: &DestinationId) -> Result<(), PlaybackError>;

    async fn leave(&self, destination: &DestinationId) -> Result<(), PlaybackError>;
}
