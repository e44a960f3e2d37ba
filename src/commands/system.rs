use std::path::Path;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::system::{self, DialogKind, DialogRequest, DialogSelection};
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct OpenFolderRequest {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

pub async fn open_folder(
    State(state): State<AppState>,
    Json(request): Json<OpenFolderRequest>,
) -> Result<Json<StatusMessage>, AppError> {
    let raw = request.path.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest("path is required".to_string()));
    }
    let path = Path::new(&raw);
    let program = system::open_folder(state.launcher.as_ref(), path)?;
    Ok(Json(StatusMessage {
        status: "success",
        message: format!("Opened {} with {program}", path.display()),
    }))
}

pub async fn browse_folder(
    State(state): State<AppState>,
    Json(request): Json<DialogRequest>,
) -> Result<Json<DialogSelection>, AppError> {
    browse(state, DialogKind::Folder, request).await
}

pub async fn browse_file(
    State(state): State<AppState>,
    Json(request): Json<DialogRequest>,
) -> Result<Json<DialogSelection>, AppError> {
    browse(state, DialogKind::File, request).await
}

async fn browse(
    state: AppState,
    kind: DialogKind,
    request: DialogRequest,
) -> Result<Json<DialogSelection>, AppError> {
    let selection = system::browse(state.dialogs.clone(), kind, request, state.config.dialog_timeout).await?;
    Ok(Json(selection))
}
