pub mod negotiations;
pub mod negotiators;
pub mod scenarios;
pub mod settings;
pub mod setup;
pub mod system;

use std::path::{Path, PathBuf};

use crate::{AppError, AppState};

/// Absolute paths are taken as given; anything else is relative to the
/// user's scenarios directory.
pub(crate) fn resolve_scenario_path(state: &AppState, raw: &str) -> Result<PathBuf, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest("scenario path is required".into()));
    }
    let candidate = Path::new(raw);
    let path = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        state.dirs.scenarios.join(candidate)
    };
    if !path.exists() {
        return Err(AppError::NotFound(format!("scenario not found: {raw}")));
    }
    Ok(path)
}
