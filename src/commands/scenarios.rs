use std::path::{Path, PathBuf};

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::commands::resolve_scenario_path;
use crate::core::scenarios::formats::{self, ScenarioFormat};
use crate::core::scenarios::info::{read_info, ScenarioInfo};
use crate::core::scenarios::introspect::{
    get_scenario_files, get_ufun_info, ScenarioFilesView, UtilityFunctionInfo,
};
use crate::core::scenarios::{Issue, ScenarioError, ScenarioFormatKind};
use crate::core::setup::find_scenario_dirs;
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ScenarioQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    /// Relative to the scenarios directory.
    pub path: String,
    pub format: Option<ScenarioFormatKind>,
    pub info: Option<ScenarioInfo>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioDetails {
    pub name: String,
    pub format: ScenarioFormatKind,
    pub issues: Vec<Issue>,
    pub n_outcomes: Option<u64>,
    pub ufuns: Vec<UtilityFunctionInfo>,
    pub files: Option<ScenarioFilesView>,
    pub info: Option<ScenarioInfo>,
}

pub async fn list_scenarios(State(state): State<AppState>) -> Result<Json<Vec<ScenarioSummary>>, AppError> {
    let root = state.dirs.scenarios.clone();
    let summaries = tokio::task::spawn_blocking(move || {
        find_scenario_dirs(&root)
            .into_iter()
            .map(|dir| summarize(&root, &dir))
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(Json(summaries))
}

fn summarize(root: &Path, dir: &Path) -> ScenarioSummary {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let format = match formats::discover(dir) {
        Ok(found) => found.map(|(format, _)| format.kind()),
        Err(e) => {
            tracing::debug!("cannot detect format of {}: {e}", dir.display());
            None
        }
    };
    ScenarioSummary {
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
        format,
        info: read_info(dir).ok().flatten(),
    }
}

pub async fn scenario_details(
    State(state): State<AppState>,
    Query(query): Query<ScenarioQuery>,
) -> Result<Json<ScenarioDetails>, AppError> {
    let path = resolve_scenario_path(&state, &query.path)?;
    let cache = state.scenarios.clone();
    let details = tokio::task::spawn_blocking(move || -> Result<ScenarioDetails, AppError> {
        let scenario = cache.get_or_load(&path).map_err(not_a_scenario_is_bad_request)?;
        let is_dir = path.is_dir();
        Ok(ScenarioDetails {
            name: scenario.name.clone(),
            format: scenario.format,
            issues: scenario.outcome_space.issues.clone(),
            n_outcomes: scenario.outcome_space.cardinality().finite(),
            ufuns: scenario
                .ufuns
                .iter()
                .map(|ufun| get_ufun_info(ufun, &path))
                .collect(),
            files: if is_dir { get_scenario_files(&path) } else { None },
            info: if is_dir { read_info(&path).ok().flatten() } else { None },
        })
    })
    .await??;
    Ok(Json(details))
}

pub async fn scenario_files(
    State(state): State<AppState>,
    Query(query): Query<ScenarioQuery>,
) -> Result<Json<ScenarioFilesView>, AppError> {
    let path: PathBuf = resolve_scenario_path(&state, &query.path)?;
    let files = tokio::task::spawn_blocking(move || get_scenario_files(&path)).await?;
    files
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no scenario files found in {}", query.path)))
}

fn not_a_scenario_is_bad_request(error: ScenarioError) -> AppError {
    match error {
        ScenarioError::NotAScenario(_) => AppError::BadRequest(error.to_string()),
        other => AppError::Scenario(other),
    }
}
