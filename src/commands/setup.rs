use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::setup::{copy_bundled_scenarios, count_scenarios, CopyReport};
use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct SetupStatus {
    pub base_dir: PathBuf,
    pub scenarios_dir: PathBuf,
    pub scenario_count: usize,
    pub bundled_archive: PathBuf,
    pub bundled_available: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CopyScenariosRequest {
    pub force: bool,
    pub skip_cache: bool,
}

pub async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatus>, AppError> {
    let scenarios_dir = state.dirs.scenarios.clone();
    let scenario_count = {
        let dir = scenarios_dir.clone();
        tokio::task::spawn_blocking(move || count_scenarios(&dir)).await?
    };
    Ok(Json(SetupStatus {
        base_dir: state.dirs.base.clone(),
        scenarios_dir,
        scenario_count,
        bundled_archive: state.config.bundled_archive.clone(),
        bundled_available: state.config.bundled_archive.is_file(),
    }))
}

pub async fn copy_scenarios(
    State(state): State<AppState>,
    Json(request): Json<CopyScenariosRequest>,
) -> Result<Json<CopyReport>, AppError> {
    let archive = state.config.bundled_archive.clone();
    let target = state.dirs.scenarios.clone();
    tracing::info!(
        "copying bundled scenarios from {} (force={}, skip_cache={})",
        archive.display(),
        request.force,
        request.skip_cache
    );
    let report = tokio::task::spawn_blocking(move || {
        copy_bundled_scenarios(&archive, &target, request.force, request.skip_cache)
    })
    .await?;

    if report.copied > 0 {
        state.scenarios.clear();
    }
    tracing::info!(
        "bundled scenarios: {} copied, {} skipped, {} errors",
        report.copied,
        report.skipped,
        report.errors.len()
    );
    Ok(Json(report))
}
