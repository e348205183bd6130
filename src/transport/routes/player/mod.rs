pub mod control;
pub mod destroy;
pub mod get;
pub mod start;
pub mod update;

pub use control::{forward_player, rewind_player, skip_player};
pub use destroy::destroy_player;
pub use get::{get_player, get_players};
pub use start::start_player;
pub use update::update_player;

use serde::Serialize;

use crate::{
    common::{DestinationId, Outcome},
    playback::{SessionManager, SessionSnapshot},
};

/// Body returned by every mutating player route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerChange {
    pub results: Vec<Outcome>,
    /// State after the change, absent when nothing is playing.
    pub player: Option<SessionSnapshot>,
}

impl PlayerChange {
    pub(crate) fn new(manager: &SessionManager, destination: &DestinationId, results: Vec<Outcome>) -> Self {
        Self {
            results,
            player: manager.view(destination).map(|v| v.snapshot()),
        }
    }
}
