/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

macro_rules! string_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct $name(pub String);

    impl From<String> for $name {
      fn from(s: String) -> Self {
        Self(s)
      }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self {
        Self(s.to_string())
      }
    }

    impl std::ops::Deref for $name {
      type Target = str;
      fn deref(&self) -> &Self::Target {
        &self.0
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
      }
    }
  };
}

string_id! {
  /// The real-time room a session streams into (one session per destination).
  DestinationId
}

string_id! {
  /// Voice/stage channel inside a destination.
  ChannelId
}

string_id! {
  /// Identity of a playable item. Library items use the backend's key,
  /// URL sources use `url:<url>`.
  MediaId
}

string_id! {
  /// Server-side streaming session opened implicitly by the media backend.
  BackendSessionId
}

impl MediaId {
  pub fn for_url(url: &str) -> Self {
    Self(format!("url:{}", url))
  }
}

impl BackendSessionId {
  /// Mints a fresh random session identifier.
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().simple().to_string())
  }
}

/// Unix time in milliseconds.
pub fn now_ms() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

/// Renders milliseconds as `H:MM:SS` or `M:SS`.
pub fn format_duration(ms: u64) -> String {
  let total = ms / 1000;
  let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
  if hours > 0 {
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
  } else {
    format!("{}:{:02}", minutes, seconds)
  }
}

/// Parses `H:MM:SS`, `MM:SS` or plain seconds into milliseconds.
pub fn parse_timestamp(input: &str) -> Option<u64> {
  let parts = input
    .trim()
    .split(':')
    .map(|p| p.trim().parse::<u64>().ok())
    .collect::<Option<Vec<_>>>()?;

  let seconds = match parts.as_slice() {
    [s] => *s,
    [m, s] => m * 60 + s,
    [h, m, s] => h * 3600 + m * 60 + s,
    _ => return None,
  };
  Some(seconds * 1000)
}
