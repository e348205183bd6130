use crate::configs::Config;

const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit_short: &'static str,
    pub rust_version: &'static str,
    pub dirty: bool,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            rust_version: env_or!("RUST_VERSION", "unknown"),
            dirty: matches!(option_env!("GIT_DIRTY"), Some("true")),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

pub fn print_banner(info: &BannerInfo, config: &Config) {
    crate::log_println!();
    crate::log_println!("{GREEN}         __                              __  {RESET}");
    crate::log_println!("{GREEN}  ____  / /__  _  ___________ ______/ /_ {RESET}");
    crate::log_println!("{GREEN} / __ \\/ / _ \\| |/_/ ___/ __ `/ ___/ __/ {RESET}");
    crate::log_println!("{GREEN}/ /_/ / /  __/>  </ /__/ /_/ (__  ) /_   {RESET}");
    crate::log_println!("{GREEN}/ .___/_/\\___/_/|_|\\___/\\__,_/____/\\__/  {RESET}");
    crate::log_println!("{GREEN}/_/{RESET}");
    crate::log_println!("{DIM}========================================{RESET}");
    crate::log_println!();

    row("Version", info.version, CYAN);
    row("Branch", info.branch, RESET);

    let commit = if info.dirty {
        format!("{}{YELLOW} (dirty){RESET}", info.commit_short)
    } else {
        info.commit_short.to_owned()
    };
    row("Commit", &commit, RESET);
    row("Rust", info.rust_version, RESET);
    row("Profile", info.profile, YELLOW);
    row("Plex", &config.plex.url, RESET);
    row("Stream mode", config.stream.mode.as_str(), RESET);
    row(
        "Listening",
        &format!("{}:{}", config.server.host, config.server.port),
        CYAN,
    );
    crate::log_println!();
}

fn row(label: &str, value: &str, color: &str) {
    crate::log_println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}
