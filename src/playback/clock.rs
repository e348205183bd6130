//! Wall-clock position bookkeeping.
//!
//! The transcoder never reports timestamps back, so the current position is
//! derived from a `(base_position, base_instant)` pair. The base instant is
//! reset when a replacement pipeline is spawned, not when its first byte
//! arrives; reported positions therefore run ahead by at most the pipeline's
//! startup latency.

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct PositionClock {
    base_position_ms: u64,
    base_instant: Instant,
    paused: bool,
    duration_ms: u64,
}

/// Snapshot returned by `get_progress`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_ms: u64,
    pub total_ms: u64,
    /// `None` when the duration is unknown (live or external sources).
    pub fraction: Option<f64>,
}

impl PositionClock {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            base_position_ms: 0,
            base_instant: Instant::now(),
            paused: true,
            duration_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn base_position_ms(&self) -> u64 {
        self.base_position_ms
    }

    /// Clamps to `[0, duration]` when the duration is known.
    pub fn clamp(&self, position_ms: u64) -> u64 {
        if self.duration_ms > 0 {
            position_ms.min(self.duration_ms)
        } else {
            position_ms
        }
    }

    pub fn position_at(&self, now: Instant) -> u64 {
        if self.paused {
            return self.base_position_ms;
        }
        let elapsed = now.saturating_duration_since(self.base_instant).as_millis() as u64;
        self.clamp(self.base_position_ms.saturating_add(elapsed))
    }

    pub fn now(&self) -> u64 {
        self.position_at(Instant::now())
    }

    /// Stops the clock at the current reading and returns it.
    pub fn freeze(&mut self) -> u64 {
        let position = self.now();
        self.base_position_ms = position;
        self.paused = true;
        position
    }

    /// Moves the base to `position_ms` without starting the clock.
    pub fn rebase(&mut self, position_ms: u64) {
        self.base_position_ms = self.clamp(position_ms);
    }

    /// Starts counting from `position_ms` as of `now`.
    pub fn start_at(&mut self, position_ms: u64, now: Instant) {
        self.base_position_ms = self.clamp(position_ms);
        self.base_instant = now;
        self.paused = false;
    }

    pub fn progress(&self) -> Progress {
        let current_ms = self.now();
        Progress {
            current_ms,
            total_ms: self.duration_ms,
            fraction: (self.duration_ms > 0)
                .then(|| current_ms as f64 / self.duration_ms as f64),
        }
    }
}
