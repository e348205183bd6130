use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// H.264 + Opus in MPEG-TS (screen-share style).
    #[default]
    Video,
    /// Opus in Ogg, no video.
    Audio,
}

impl StreamMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    #[serde(default)]
    pub mode: StreamMode,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Defaults to 16:9 of `height`.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_video_bitrate_kbps")]
    pub video_bitrate_kbps: u32,
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    #[serde(default = "default_preset")]
    pub preset: String,
}

impl StreamConfig {
    pub fn target_width(&self) -> u32 {
        // libx264 wants even dimensions
        self.width.unwrap_or((self.height * 16 / 9) & !1)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::default(),
            height: default_height(),
            width: None,
            frame_rate: default_frame_rate(),
            video_bitrate_kbps: default_video_bitrate_kbps(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            preset: default_preset(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Pause after a confirmed kill before a new backend session is opened.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,
    /// stderr lines retained for abnormal-exit reports.
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            kill_grace_ms: default_kill_grace_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            diagnostic_lines: default_diagnostic_lines(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            format: default_format(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    /// argv of the relay process; `{destination}` and `{channel}` are substituted.
    #[serde(default = "default_relay_command")]
    pub command: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command: default_relay_command(),
        }
    }
}

fn default_height() -> u32 {
    1080
}

fn default_frame_rate() -> u32 {
    30
}

fn default_video_bitrate_kbps() -> u32 {
    8000
}

fn default_audio_bitrate_kbps() -> u32 {
    192
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_kill_timeout_ms() -> u64 {
    5000
}

fn default_diagnostic_lines() -> usize {
    20
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_format() -> String {
    "bestvideo[height<=1080]+bestaudio/best[height<=1080]/best".to_string()
}

fn default_relay_command() -> Vec<String> {
    [
        "ffmpeg",
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        "pipe:0",
        "-c",
        "copy",
        "-f",
        "mpegts",
        "srt://127.0.0.1:9000?streamid={destination}/{channel}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
