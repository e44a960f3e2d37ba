use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::core::params::NegotiationParams;
use crate::runtime::negotiations::NegotiationSessionView;
use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct CliArgs {
    pub args: Vec<String>,
}

pub async fn cli_args(Json(params): Json<NegotiationParams>) -> Json<CliArgs> {
    Json(CliArgs {
        args: params.to_cli_args(),
    })
}

pub async fn start_negotiation(
    State(state): State<AppState>,
    Json(mut params): Json<NegotiationParams>,
) -> Result<Json<NegotiationSessionView>, AppError> {
    // Scenario names from the listing are relative to the scenarios directory.
    if let Some(scenario) = params.scenario.as_deref() {
        let candidate = state.dirs.scenarios.join(scenario);
        if !std::path::Path::new(scenario).is_absolute() && candidate.exists() {
            params.scenario = Some(candidate.to_string_lossy().to_string());
        }
    }

    std::fs::create_dir_all(&state.dirs.negotiations)?;
    let view = state.negotiations.start(params, &state.dirs.negotiations)?;
    Ok(Json(view))
}

pub async fn list_negotiations(State(state): State<AppState>) -> Json<Vec<NegotiationSessionView>> {
    Json(state.negotiations.list())
}

pub async fn get_negotiation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NegotiationSessionView>, AppError> {
    state
        .negotiations
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("negotiation session not found: {id}")))
}

pub async fn cancel_negotiation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NegotiationSessionView>, AppError> {
    Ok(Json(state.negotiations.cancel(&id)?))
}
