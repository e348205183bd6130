use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::{MediaId, now_ms, persist};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeEntry {
    pub position: u64,
    /// Unix millis of the last write.
    pub updated_at: u64,
    pub label: String,
}

/// Durable `media id -> resume position` map.
///
/// Loaded once at startup, flushed to disk synchronously on every mutation.
/// All writers go through the session manager, so last write wins.
pub struct ResumeStore {
    path: Option<PathBuf>,
    ttl_ms: u64,
    min_position_ms: u64,
    entries: Mutex<HashMap<MediaId, ResumeEntry>>,
}

impl ResumeStore {
    /// Loads the store, starting empty on a missing or corrupt file, and drops
    /// entries older than `ttl`.
    pub fn open(path: impl AsRef<Path>, ttl: Duration, min_position_ms: u64) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match persist::load_json::<HashMap<MediaId, ResumeEntry>>(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Resume store unreadable, starting empty: {}", e);
                HashMap::new()
            }
        };

        let store = Self {
            path: Some(path),
            ttl_ms: ttl.as_millis() as u64,
            min_position_ms,
            entries: Mutex::new(entries),
        };

        let pruned = store.prune_at(now_ms());
        info!(
            "Resume store loaded: {} entries ({} expired)",
            store.len(),
            pruned
        );
        store
    }

    /// Non-persistent store, used when no path is configured.
    pub fn in_memory(ttl: Duration, min_position_ms: u64) -> Self {
        Self {
            path: None,
            ttl_ms: ttl.as_millis() as u64,
            min_position_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_days(path: impl AsRef<Path>, ttl_days: u64, min_position_ms: u64) -> Self {
        Self::open(
            path,
            Duration::from_millis(ttl_days.saturating_mul(DAY_MS)),
            min_position_ms,
        )
    }

    pub fn min_position_ms(&self) -> u64 {
        self.min_position_ms
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, media: &MediaId) -> Option<u64> {
        self.entry_at(media, now_ms()).map(|e| e.position)
    }

    pub fn entry(&self, media: &MediaId) -> Option<ResumeEntry> {
        self.entry_at(media, now_ms())
    }

    fn entry_at(&self, media: &MediaId, now: u64) -> Option<ResumeEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get(media)?.clone();
        if now.saturating_sub(entry.updated_at) > self.ttl_ms {
            entries.remove(media);
            self.flush(&entries);
            debug!("Resume entry for {} expired", media);
            return None;
        }
        Some(entry)
    }

    /// Records a position. Positions under the minimum are ignored, so an
    /// earlier, larger value survives an aborted start.
    pub fn put(&self, media: &MediaId, position_ms: u64, label: &str) -> bool {
        if position_ms < self.min_position_ms {
            debug!(
                "Not recording resume point for {} at {}ms (below {}ms)",
                media, position_ms, self.min_position_ms
            );
            return false;
        }

        let mut entries = self.entries.lock();
        entries.insert(
            media.clone(),
            ResumeEntry {
                position: position_ms,
                updated_at: now_ms(),
                label: label.to_string(),
            },
        );
        self.flush(&entries);
        true
    }

    pub fn clear(&self, media: &MediaId) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.remove(media).is_some();
        if removed {
            self.flush(&entries);
        }
        removed
    }

    fn prune_at(&self, now: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_sub(e.updated_at) <= self.ttl_ms);
        let pruned = before - entries.len();
        if pruned > 0 {
            self.flush(&entries);
        }
        pruned
    }

    fn flush(&self, entries: &HashMap<MediaId, ResumeEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = persist::write_json_durable(path, entries) {
            warn!("Failed to persist resume store: {}", e);
        }
    }
}
