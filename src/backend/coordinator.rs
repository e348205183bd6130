use std::sync::Arc;

use tracing::{debug, warn};

use super::{MediaBackend, OrphanTracker, PlayableStream};
use crate::common::{BackendSessionId, MediaId, PlaybackError};

/// Owns at most one backend session on behalf of a playback session.
///
/// Every `acquire` closes the previous backend session first and mints a fresh
/// id, which is recorded in the [`OrphanTracker`] before the backend sees it.
pub struct RemoteSession {
    backend: Arc<dyn MediaBackend>,
    tracker: Arc<OrphanTracker>,
    current: Option<BackendSessionId>,
}

impl RemoteSession {
    pub fn new(backend: Arc<dyn MediaBackend>, tracker: Arc<OrphanTracker>) -> Self {
        Self {
            backend,
            tracker,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&BackendSessionId> {
        self.current.as_ref()
    }

    pub async fn acquire(&mut self, media: &MediaId) -> Result<PlayableStream, PlaybackError> {
        self.release().await;

        let id = BackendSessionId::generate();
        self.tracker.insert(&id);
        self.current = Some(id.clone());
        debug!("Opening backend session {} for {}", id, media);

        match self.backend.resolve_playable(media, &id).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.release().await;
                Err(e)
            }
        }
    }

    /// Closes the tracked backend session, if any. Never fails; an id whose
    /// termination could not be confirmed stays tracked for startup recovery.
    pub async fn release(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };

        match self.backend.terminate_session(&id).await {
            Ok(()) => {
                self.tracker.remove(&id);
                debug!("Released backend session {}", id);
            }
            Err(e) => warn!("Failed to release backend session {}: {}", id, e),
        }
    }
}
