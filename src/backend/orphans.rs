use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::MediaBackend;
use crate::common::{BackendSessionId, persist};

/// Durable set of backend sessions that have been opened but not yet confirmed
/// closed. Every mutation is written through before returning so that a crash
/// never loses an id.
pub struct OrphanTracker {
    path: Option<PathBuf>,
    ids: Mutex<BTreeSet<BackendSessionId>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub attempted: usize,
    pub terminated: usize,
    pub failed: usize,
}

impl OrphanTracker {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match persist::load_json::<BTreeSet<BackendSessionId>>(&path) {
            Ok(ids) => ids.unwrap_or_default(),
            Err(e) => {
                warn!("Orphan session list unreadable, starting empty: {}", e);
                BTreeSet::new()
            }
        };

        Self {
            path: Some(path),
            ids: Mutex::new(ids),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            ids: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn insert(&self, id: &BackendSessionId) {
        let mut ids = self.ids.lock();
        if ids.insert(id.clone()) {
            self.flush(&ids);
        }
    }

    pub fn remove(&self, id: &BackendSessionId) {
        let mut ids = self.ids.lock();
        if ids.remove(id) {
            self.flush(&ids);
        }
    }

    pub fn contains(&self, id: &BackendSessionId) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn snapshot(&self) -> Vec<BackendSessionId> {
        self.ids.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tries to terminate every tracked session left over from a previous run.
    /// Ids are dropped whether or not termination succeeded.
    pub async fn recover(&self, backend: &dyn MediaBackend) -> RecoveryReport {
        let stale = self.snapshot();
        let mut report = RecoveryReport {
            attempted: stale.len(),
            ..Default::default()
        };

        if stale.is_empty() {
            return report;
        }

        info!(
            "Terminating {} orphaned {} session(s)",
            stale.len(),
            backend.name()
        );
        for id in &stale {
            match backend.terminate_session(id).await {
                Ok(()) => report.terminated += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Could not terminate orphaned session {}: {}", id, e);
                }
            }
        }

        {
            let mut ids = self.ids.lock();
            for id in &stale {
                ids.remove(id);
            }
            self.flush(&ids);
        }

        info!(
            "Orphan recovery done: {} terminated, {} dropped after failure",
            report.terminated, report.failed
        );
        report
    }

    fn flush(&self, ids: &BTreeSet<BackendSessionId>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = persist::write_json_durable(path, ids) {
            warn!("Failed to persist backend session list: {}", e);
        }
    }
}
