use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

/// Reads and parses a JSON file.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| AppError::json(path, e))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Writes `content` next to `path` in a temporary file, then renames it over
/// `path`. A crash mid-write leaves the previous file intact.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), AppError> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(|e| AppError::io(&dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".chi-tui-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| AppError::io(&dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| AppError::io(path, e.error))?;

    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Pretty-prints `value` and writes it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut json =
        serde_json::to_string_pretty(value).map_err(|e| AppError::JsonSerialize { source: e })?;
    json.push('\n');
    write_text_atomic(path, &json)
}

/// Home directory, or an error when it cannot be determined.
pub fn home_dir() -> Result<PathBuf, AppError> {
    dirs::home_dir().ok_or_else(|| AppError::Message("home directory not found".to_string()))
}
