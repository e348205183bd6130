use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{MediaResolver, ResolvedMedia};
use crate::{common::PlaybackError, configs::ResolverConfig};

pub struct YtDlpResolver {
    binary: String,
    format: String,
}

impl YtDlpResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            format: config.format.clone(),
        }
    }

    fn args<'a>(&'a self, url: &'a str) -> Vec<&'a str> {
        vec![
            "--dump-single-json",
            "--no-playlist",
            "--no-warnings",
            "-f",
            self.format.as_str(),
            url,
        ]
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve_info(&self, url: &str) -> Result<ResolvedMedia, PlaybackError> {
        debug!("Resolving {} via {}", url, self.binary);

        let output = Command::new(&self.binary)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PlaybackError::UpstreamUnavailable(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("no output").trim().to_string();
            warn!("yt-dlp failed for {}: {}", url, reason);
            return Err(PlaybackError::UpstreamUnavailable(format!("yt-dlp: {}", reason)));
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PlaybackError::UpstreamUnavailable(format!("invalid yt-dlp output: {}", e)))?;

        parse_info(&info).ok_or_else(|| PlaybackError::NotPlayable(format!("no playable format for {}", url)))
    }
}

/// Extracts the selected format(s) from a `--dump-single-json` document.
pub(crate) fn parse_info(info: &Value) -> Option<ResolvedMedia> {
    let title = info["title"].as_str().unwrap_or("Unknown").to_string();
    let duration_ms = info["duration"]
        .as_f64()
        .filter(|d| *d > 0.0)
        .map(|d| (d * 1000.0) as u64)
        .unwrap_or(0);

    let (media_url, audio_url, headers) = match info["requested_formats"].as_array() {
        Some(formats) if formats.len() >= 2 => {
            let video = formats
                .iter()
                .find(|f| f["vcodec"].as_str().is_some_and(|c| c != "none"))
                .unwrap_or(&formats[0]);
            let audio = formats
                .iter()
                .find(|f| !std::ptr::eq(*f, video))
                .unwrap_or(&formats[1]);
            (
                video["url"].as_str()?.to_string(),
                audio["url"].as_str().map(str::to_string),
                http_headers(video),
            )
        }
        Some(formats) if formats.len() == 1 => {
            (formats[0]["url"].as_str()?.to_string(), None, http_headers(&formats[0]))
        }
        _ => (info["url"].as_str()?.to_string(), None, http_headers(info)),
    };

    Some(ResolvedMedia {
        title,
        duration_ms,
        media_url,
        audio_url,
        headers,
    })
}

fn http_headers(format: &Value) -> Vec<(String, String)> {
    format["http_headers"]
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
