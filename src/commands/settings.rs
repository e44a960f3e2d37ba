use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::core::settings::{load_settings, save_settings};
use crate::{AppError, AppState};

pub async fn get_settings(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(load_settings(&state.dirs.settings, &name)?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, AppError> {
    save_settings(&state.dirs.settings, &name, &value)?;
    tracing::debug!("saved settings {name}");
    Ok(Json(value))
}
