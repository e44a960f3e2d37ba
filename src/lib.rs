//! negmas-app backend library.
//!
//! Serves the negotiation workbench front end over a JSON HTTP API:
//! - `commands`: axum handlers, one module per API area
//! - `core`: scenario loading and introspection, provisioning, OS bridges,
//!   negotiation parameters and the maintenance jobs used by the binaries
//! - `runtime`: negotiation sessions running the external `negotiate` command
//! - `config`: environment-driven configuration

mod commands;
pub mod config;
pub mod core;
pub mod runtime;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::core::scenarios::cache::ScenarioCache;
use crate::core::scenarios::ScenarioError;
use crate::core::settings::SettingsError;
use crate::core::setup::{ensure_user_directories, UserDirectories};
use crate::core::system::{
    DialogError, FileDialogs, LaunchError, Launcher, NativeDialogs, SystemLauncher,
};
use crate::runtime::negotiations::{NegotiationRegistry, RunnerError};

pub const DEFAULT_LOG_FILTER: &str = "negmas_app=debug,negmas_app_lib=debug,tower_http=info,info";

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Scenario(#[from] ScenarioError),
    #[error("{0}")]
    Other(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Io(_) | AppError::Scenario(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::debug!("request rejected ({status}): {self}");
        }
        let body = serde_json::json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<LaunchError> for AppError {
    fn from(value: LaunchError) -> Self {
        match value {
            LaunchError::NotFound(_) => AppError::NotFound(value.to_string()),
            LaunchError::NotADirectory(_) => AppError::BadRequest(value.to_string()),
            LaunchError::UnsupportedPlatform(_) | LaunchError::NoFileManager { .. } => {
                AppError::Other(value.to_string())
            }
        }
    }
}

impl From<DialogError> for AppError {
    fn from(value: DialogError) -> Self {
        match value {
            DialogError::Timeout(_) => AppError::Timeout(value.to_string()),
            DialogError::Failed(_) => AppError::Other(value.to_string()),
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(value: SettingsError) -> Self {
        match value {
            SettingsError::InvalidName(_) | SettingsError::NotAnObject(_) => {
                AppError::BadRequest(value.to_string())
            }
            SettingsError::Io { .. } | SettingsError::Json { .. } => AppError::Other(value.to_string()),
        }
    }
}

impl From<RunnerError> for AppError {
    fn from(value: RunnerError) -> Self {
        match value {
            RunnerError::NotFound(_) => AppError::NotFound(value.to_string()),
            RunnerError::EmptyCommand | RunnerError::Spawn { .. } => AppError::Other(value.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        AppError::Other(format!("background task failed: {value}"))
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<AppConfig>,
    pub dirs: Arc<UserDirectories>,
    pub dialogs: Arc<dyn FileDialogs>,
    pub launcher: Arc<dyn Launcher>,
    pub negotiations: Arc<NegotiationRegistry>,
    pub scenarios: Arc<ScenarioCache>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_backends(config, Arc::new(NativeDialogs), Arc::new(SystemLauncher))
    }

    pub fn with_backends(
        config: AppConfig,
        dialogs: Arc<dyn FileDialogs>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let negotiations = NegotiationRegistry::new(&config.negotiate_command);
        Self::with_registry(config, dialogs, launcher, negotiations)
    }

    pub fn with_registry(
        config: AppConfig,
        dialogs: Arc<dyn FileDialogs>,
        launcher: Arc<dyn Launcher>,
        negotiations: NegotiationRegistry,
    ) -> Self {
        Self {
            dirs: Arc::new(config.directories()),
            config: Arc::new(config),
            dialogs,
            launcher,
            negotiations: Arc::new(negotiations),
            scenarios: Arc::new(ScenarioCache::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub(crate) fn build_router(state: AppState) -> Router {
    let static_dir: Option<PathBuf> = state.config.static_dir.clone();

    let router = Router::new()
        // system
        .route("/api/system/open-folder", post(commands::system::open_folder))
        .route("/api/system/browse-folder", post(commands::system::browse_folder))
        .route("/api/system/browse-file", post(commands::system::browse_file))
        // setup
        .route("/api/setup/status", get(commands::setup::setup_status))
        .route("/api/setup/scenarios", post(commands::setup::copy_scenarios))
        // scenarios
        .route("/api/scenarios", get(commands::scenarios::list_scenarios))
        .route("/api/scenarios/details", get(commands::scenarios::scenario_details))
        .route("/api/scenarios/files", get(commands::scenarios::scenario_files))
        // negotiators
        .route("/api/negotiators", get(commands::negotiators::list_negotiators))
        // negotiations
        .route("/api/negotiations/cli-args", post(commands::negotiations::cli_args))
        .route(
            "/api/negotiations",
            get(commands::negotiations::list_negotiations).post(commands::negotiations::start_negotiation),
        )
        .route("/api/negotiations/:id", get(commands::negotiations::get_negotiation))
        .route("/api/negotiations/:id/cancel", post(commands::negotiations::cancel_negotiation))
        // settings
        .route(
            "/api/settings/:name",
            get(commands::settings::get_settings).put(commands::settings::put_settings),
        );

    let router = match static_dir {
        Some(dir) => {
            tracing::info!("serving front end from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// ---------------------------------------------------------------------------
// Application entry point
// ---------------------------------------------------------------------------

/// Install the global subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub async fn run(config: AppConfig) -> Result<(), String> {
    ensure_user_directories(&config.base_dir).map_err(|e| {
        format!(
            "failed to create user directories under {}: {e}",
            config.base_dir.display()
        )
    })?;

    let bind = config.bind;
    let state = AppState::new(config);
    tracing::info!(
        "data directory {}, negotiate command {:?}",
        state.dirs.base.display(),
        state.config.negotiate_command
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| format!("failed to bind {bind}: {e}"))?;
    tracing::info!("negmas-app listening on http://{bind}");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::fakes::{FixedDialogs, RecordingLauncher};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        _tmp: TempDir,
        base: PathBuf,
        app: Router,
    }

    fn harness_with(dialogs: FixedDialogs, launcher: RecordingLauncher, timeout: Duration) -> Harness {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("app");
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.base_dir = base.clone();
        config.bundled_archive = tmp.path().join("missing.zip");
        config.dialog_timeout = timeout;
        ensure_user_directories(&base).unwrap();

        let state = AppState::with_backends(config, Arc::new(dialogs), Arc::new(launcher));
        Harness {
            _tmp: tmp,
            base,
            app: build_router(state),
        }
    }

    fn harness() -> Harness {
        harness_with(
            FixedDialogs {
                answer: None,
                delay: Duration::ZERO,
            },
            RecordingLauncher::default(),
            Duration::from_secs(5),
        )
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_open_folder_status_mapping() {
        let h = harness();
        let file = h.base.join("note.txt");
        std::fs::write(&file, "x").unwrap();

        let (status, body) = call(
            &h.app,
            "POST",
            "/api/system/open-folder",
            Some(json!({"path": h.base.join("nope")})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");

        let (status, _) = call(&h.app, "POST", "/api/system/open-folder", Some(json!({"path": file}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &h.app,
            "POST",
            "/api/system/open-folder",
            Some(json!({"path": h.base.join("scenarios")})),
        )
        .await;
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "success");
        }
    }

    #[tokio::test]
    async fn test_open_folder_requires_path() {
        let h = harness();
        for body in [json!({}), json!({"path": ""}), json!({"path": "   "})] {
            let (status, response) = call(&h.app, "POST", "/api/system/open-folder", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["status"], "error");
            assert_eq!(response["message"], "path is required");
        }
    }

    #[tokio::test]
    async fn test_browse_folder_selection_and_timeout() {
        let picked = harness_with(
            FixedDialogs {
                answer: Some(PathBuf::from("/data/scenarios")),
                delay: Duration::ZERO,
            },
            RecordingLauncher::default(),
            Duration::from_secs(5),
        );
        let (status, body) = call(&picked.app, "POST", "/api/system/browse-folder", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"path": "/data/scenarios", "cancelled": false}));

        let cancelled = harness();
        let (_, body) = call(
            &cancelled.app,
            "POST",
            "/api/system/browse-file",
            Some(json!({"title": "Pick", "file_types": [["YAML", "*.yaml"]]})),
        )
        .await;
        assert_eq!(body, json!({"path": null, "cancelled": true}));

        let slow = harness_with(
            FixedDialogs {
                answer: None,
                delay: Duration::from_millis(500),
            },
            RecordingLauncher::default(),
            Duration::from_millis(50),
        );
        let (status, body) = call(&slow.app, "POST", "/api/system/browse-folder", Some(json!({}))).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_setup_status_and_missing_bundle() {
        let h = harness();
        let (status, body) = call(&h.app, "GET", "/api/setup/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scenario_count"], 0);
        assert_eq!(body["bundled_available"], false);

        let (status, body) = call(&h.app, "POST", "/api/setup/scenarios", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["copied"], 0);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_endpoints() {
        let h = harness();
        let dir = h.base.join("scenarios").join("Laptop");
        std::fs::create_dir_all(&dir).unwrap();
        crate::core::scenarios::fixtures::write_yaml_laptop(&dir);

        let (status, body) = call(&h.app, "GET", "/api/scenarios", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Laptop");
        assert_eq!(body[0]["path"], "Laptop");
        assert_eq!(body[0]["format"], "yaml");

        let (status, body) = call(&h.app, "GET", "/api/scenarios/details?path=Laptop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ufuns"].as_array().unwrap().len(), 2);
        assert_eq!(body["ufuns"][0]["name"], "buyer");
        assert_eq!(body["info"]["description"], "laptops");
        assert!(!body["files"]["domain"].as_str().unwrap().starts_with('/'));

        let (status, body) = call(&h.app, "GET", "/api/scenarios/files?path=Laptop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["utilities"].as_array().unwrap().len(), 2);

        let (status, _) = call(&h.app, "GET", "/api/scenarios/details?path=Nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_negotiators_and_cli_args() {
        let h = harness();
        let (status, body) = call(&h.app, "GET", "/api/negotiators?group=simple", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().iter().all(|n| n["group"] == "simple"));

        let (status, body) = call(
            &h.app,
            "POST",
            "/api/negotiations/cli-args",
            Some(json!({"steps": 100, "negotiators": ["AspirationNegotiator"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let args: Vec<String> = serde_json::from_value(body["args"].clone()).unwrap();
        assert!(args.windows(2).any(|w| w == ["--steps", "100"]));
        assert!(args.contains(&"--no-plot-show".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_negotiation_is_404() {
        let h = harness();
        let (status, _) = call(&h.app, "GET", "/api/negotiations/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&h.app, "POST", "/api/negotiations/unknown/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = call(&h.app, "GET", "/api/negotiations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_negotiation_resolves_scenario() {
        use crate::runtime::negotiations::{CommandSpawner, NegotiationRegistry};

        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.base_dir = tmp.path().to_path_buf();
        let dirs = ensure_user_directories(tmp.path()).unwrap();
        std::fs::create_dir_all(dirs.scenarios.join("Laptop")).unwrap();

        let registry = NegotiationRegistry::with_spawner(
            "sh",
            vec!["-c".into(), "echo \"$@\"".into(), "negotiate".into()],
            Arc::new(CommandSpawner),
        );
        let state = AppState::with_registry(
            config,
            Arc::new(FixedDialogs {
                answer: None,
                delay: Duration::ZERO,
            }),
            Arc::new(RecordingLauncher::default()),
            registry,
        );
        let app = build_router(state);

        let (status, body) = call(
            &app,
            "POST",
            "/api/negotiations",
            Some(json!({"scenario": "Laptop", "steps": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        let command: Vec<String> = serde_json::from_value(body["command"].clone()).unwrap();
        let scenario_at = command.iter().position(|arg| arg == "--scenario").unwrap();
        assert_eq!(command[scenario_at + 1], dirs.scenarios.join("Laptop").to_string_lossy());

        let id = body["id"].as_str().unwrap().to_string();
        let (status, body) = call(&app, "GET", &format!("/api/negotiations/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        let (_, list) = call(&app, "GET", "/api/negotiations", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_round_trip_and_bad_name() {
        let h = harness();
        let (status, body) = call(&h.app, "GET", "/api/settings/general", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let doc = json!({"theme": "dark"});
        let (status, _) = call(&h.app, "PUT", "/api/settings/general", Some(doc.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&h.app, "GET", "/api/settings/general", None).await;
        assert_eq!(body, doc);

        let (status, _) = call(&h.app, "PUT", "/api/settings/general", Some(json!([1]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&h.app, "GET", "/api/settings/bad%20name", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
