use std::time::Duration;

use reqwest::{
  Client, Error,
  header::{ACCEPT, HeaderMap, HeaderValue},
};

const DEFAULT_USER_AGENT: &str = concat!("plexcast/", env!("CARGO_PKG_VERSION"));

pub struct HttpClient;

impl HttpClient {
  pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
  }

  /// JSON client used for media-backend calls.
  pub fn new() -> Result<Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
      .user_agent(Self::default_user_agent())
      .default_headers(headers)
      .connect_timeout(Duration::from_secs(5))
      .timeout(Duration::from_secs(10))
      .build()
  }
}
