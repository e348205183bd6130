pub mod backend;
pub mod common;
pub mod configs;
pub mod playback;
pub mod resolver;
pub mod server;
pub mod stream;
pub mod transcode;
pub mod transport;

#[cfg(test)]
mod testing;
