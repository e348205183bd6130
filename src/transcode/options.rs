use crate::configs::{StreamConfig, StreamMode};

/// What the transcoder reads from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscodeInput {
    pub url: String,
    /// Sent with every HTTP request for both inputs.
    pub headers: Vec<(String, String)>,
    /// Separate audio track, muxed with `url`'s video.
    pub audio_url: Option<String>,
}

impl TranscodeInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Declarative option record; the argument list is a pure function of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOptions {
    pub mode: StreamMode,
    pub target_width: u32,
    pub target_height: u32,
    pub frame_rate: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub preset: String,
    /// 0..=200; applied as a filter gain of `volume_percent / 100`.
    pub volume_percent: u16,
    pub start_offset_ms: u64,
}

impl TranscodeOptions {
    pub fn from_config(config: &StreamConfig, volume_percent: u16, start_offset_ms: u64) -> Self {
        Self {
            mode: config.mode,
            target_width: config.target_width(),
            target_height: config.height,
            frame_rate: config.frame_rate,
            video_bitrate_kbps: config.video_bitrate_kbps,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            preset: config.preset.clone(),
            volume_percent,
            start_offset_ms,
        }
    }

    pub fn gain(&self) -> f32 {
        self.volume_percent as f32 / 100.0
    }
}

fn header_block(headers: &[(String, String)]) -> Option<String> {
    if headers.is_empty() {
        return None;
    }
    Some(
        headers
            .iter()
            .map(|(k, v)| format!("{}: {}\r\n", k, v))
            .collect(),
    )
}

fn push_input(args: &mut Vec<String>, url: &str, headers: Option<&str>, offset_ms: u64) {
    if let Some(headers) = headers {
        args.extend(["-headers".into(), headers.to_string()]);
    }
    if offset_ms > 0 {
        args.extend(["-ss".into(), format!("{:.3}", offset_ms as f64 / 1000.0)]);
    }
    args.extend(["-re".into(), "-i".into(), url.to_string()]);
}

/// ffmpeg argument list writing the encoded stream to stdout.
pub fn build_args(input: &TranscodeInput, opts: &TranscodeOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "warning"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let headers = header_block(&input.headers);
    push_input(&mut args, &input.url, headers.as_deref(), opts.start_offset_ms);

    let audio_map = match &input.audio_url {
        Some(audio) => {
            push_input(&mut args, audio, headers.as_deref(), opts.start_offset_ms);
            "1:a:0"
        }
        None => "0:a:0?",
    };

    if opts.mode == StreamMode::Video {
        let (w, h) = (opts.target_width, opts.target_height);
        let kbps = opts.video_bitrate_kbps;
        args.extend([
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            audio_map.into(),
            "-vf".into(),
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1"
            ),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            opts.preset.clone(),
            "-tune".into(),
            "zerolatency".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            opts.frame_rate.to_string(),
            "-g".into(),
            (opts.frame_rate * 2).to_string(),
            "-b:v".into(),
            format!("{}k", kbps),
            "-maxrate".into(),
            format!("{}k", kbps),
            "-bufsize".into(),
            format!("{}k", kbps * 2),
        ]);
    } else {
        args.extend(["-map".into(), audio_map.into(), "-vn".into()]);
    }

    if opts.volume_percent != 100 {
        args.extend(["-af".into(), format!("volume={:.2}", opts.gain())]);
    }

    args.extend([
        "-c:a".into(),
        "libopus".into(),
        "-b:a".into(),
        format!("{}k", opts.audio_bitrate_kbps),
        "-ar".into(),
        "48000".into(),
        "-ac".into(),
        "2".into(),
        "-f".into(),
        match opts.mode {
            StreamMode::Video => "mpegts",
            StreamMode::Audio => "ogg",
        }
        .into(),
        "pipe:1".into(),
    ]);

    args
}
