use std::sync::Arc;

use crate::{configs::Config, playback::{ResumeStore, SessionManager}};

/// Top-level application state shared by every handler.
pub struct AppState {
    pub manager: SessionManager,
    pub resume: Arc<ResumeStore>,
    pub config: Config,
    /// Unix millis at which the server came up.
    pub started_at: u64,
}

impl AppState {
    pub fn new(manager: SessionManager, config: Config) -> Self {
        Self {
            resume: manager.resume_store().clone(),
            manager,
            config,
            started_at: crate::common::now_ms(),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        crate::common::now_ms().saturating_sub(self.started_at)
    }
}
