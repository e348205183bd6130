use std::{
  fs::{self, File},
  io::Write,
  path::Path,
};

use serde::{Serialize, de::DeserializeOwned};

use super::errors::PersistError;

/// Reads a JSON document. A missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
  let raw = match fs::read(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(PersistError::Io {
        path: path.display().to_string(),
        source,
      });
    }
  };

  if raw.iter().all(u8::is_ascii_whitespace) {
    return Ok(None);
  }

  serde_json::from_slice(&raw)
    .map(Some)
    .map_err(|source| PersistError::Malformed {
      path: path.display().to_string(),
      source,
    })
}

/// Writes a JSON document so that it survives a crash right after returning:
/// temp file, fsync, atomic rename, then fsync of the parent directory.
pub fn write_json_durable<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
  let io_err = |source| PersistError::Io {
    path: path.display().to_string(),
    source,
  };

  let body = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Malformed {
    path: path.display().to_string(),
    source,
  })?;

  let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
  if let Some(parent) = parent {
    fs::create_dir_all(parent).map_err(io_err)?;
  }

  let tmp = path.with_extension("tmp");
  {
    let mut file = File::create(&tmp).map_err(io_err)?;
    file.write_all(&body).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
  }
  fs::rename(&tmp, path).map_err(io_err)?;

  #[cfg(unix)]
  if let Some(parent) = parent {
    if let Ok(dir) = File::open(parent) {
      let _ = dir.sync_all();
    }
  }

  Ok(())
}
