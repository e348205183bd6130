pub mod banner;
pub mod errors;
pub mod http;
pub mod logger;
pub mod persist;
pub mod types;

pub use errors::*;
pub use http::*;
pub use types::*;
