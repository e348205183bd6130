pub mod base;
pub mod logging;
pub mod plex;
pub mod server;
pub mod storage;
pub mod stream;

pub use base::*;
pub use logging::*;
pub use plex::*;
pub use server::*;
pub use storage::*;
pub use stream::*;
