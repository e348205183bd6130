use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
  pub server: ServerConfig,
  pub plex: PlexConfig,
  #[serde(default)]
  pub stream: StreamConfig,
  #[serde(default)]
  pub transcoder: TranscoderConfig,
  #[serde(default)]
  pub resolver: ResolverConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub relay: RelayConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

impl Config {
  pub fn load() -> AnyResult<Self> {
    let config_path = if std::path::Path::new("config.toml").exists() {
      "config.toml"
    } else if std::path::Path::new("config.default.toml").exists() {
      "config.default.toml"
    } else {
      return Err("config.toml or config.default.toml not found".into());
    };

    crate::log_println!("Loading configuration from: {}", config_path);

    let config_str = std::fs::read_to_string(config_path)?;
    Self::parse(&config_str).map_err(|e| format!("{}: {}", config_path, e).into())
  }

  pub fn parse(raw: &str) -> AnyResult<Self> {
    if raw.trim().is_empty() {
      return Err("configuration is empty".into());
    }
    let config: Config = toml::from_str(raw)?;
    if config.plex.token.is_empty() {
      return Err("plex.token must be set".into());
    }
    Ok(config)
  }
}
