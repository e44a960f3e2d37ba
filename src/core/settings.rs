//! Named JSON documents under `settings/`, one file per name.

use std::path::{Path, PathBuf};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid settings name {0:?}: use letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("settings {0} must be a JSON object")]
    NotAnObject(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn settings_file(dir: &Path, name: &str) -> Result<PathBuf, SettingsError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(SettingsError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{name}.json")))
}

/// The stored document, or an empty object when nothing was saved yet.
pub fn load_settings(dir: &Path, name: &str) -> Result<Value, SettingsError> {
    let path = settings_file(dir, name)?;
    if !path.is_file() {
        return Ok(Value::Object(Default::default()));
    }
    let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SettingsError::Json { path, source })
}

pub fn save_settings(dir: &Path, name: &str, value: &Value) -> Result<(), SettingsError> {
    let path = settings_file(dir, name)?;
    if !value.is_object() {
        return Err(SettingsError::NotAnObject(name.to_string()));
    }
    std::fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let text = serde_json::to_string_pretty(value).map_err(|source| SettingsError::Json {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, text).map_err(|source| SettingsError::Io { path, source })
}
