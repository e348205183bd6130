use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlexConfig {
    pub url: String,
    pub token: String,
    /// Sent as `X-Plex-Client-Identifier`; identifies this process to the server.
    #[serde(default = "default_client_identifier")]
    pub client_identifier: String,
    #[serde(default = "default_product")]
    pub product: String,
}

impl PlexConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

fn default_client_identifier() -> String {
    "plexcast".to_string()
}

fn default_product() -> String {
    "plexcast".to_string()
}
