pub mod clock;
pub mod events;
pub mod manager;
pub mod resume;
pub mod session;

pub use clock::{PositionClock, Progress};
pub use events::{EndReason, PlaybackEvent};
pub use manager::{
    Collaborators, DEFAULT_JUMP_MS, DEFAULT_VOLUME, MAX_VOLUME, ManagerSettings, SessionManager, SourceRequest,
    StartRequest,
};
pub use resume::{ResumeEntry, ResumeStore};
pub use session::{PlaybackSession, PlaybackSource, SessionPhase, SessionSnapshot, SessionView};
