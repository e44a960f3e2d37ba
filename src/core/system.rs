//! Bridges to the desktop: opening folders in the platform file manager and
//! native file/folder pickers.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File managers tried in order on Linux and other Unix desktops.
pub const LINUX_FILE_MANAGERS: [&str; 7] = [
    "xdg-open", "nautilus", "dolphin", "thunar", "nemo", "pcmanfm", "caja",
];

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("opening folders is not supported on {0}")]
    UnsupportedPlatform(String),
    #[error("no file manager could open {path}: {detail}")]
    NoFileManager { path: String, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("dialog did not close within {0} seconds")]
    Timeout(u64),
    #[error("dialog failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Folder opening
// ---------------------------------------------------------------------------

/// Starts an external program on a path without waiting for it.
pub trait Launcher: Send + Sync {
    fn launch(&self, program: &str, path: &Path) -> std::io::Result<()>;
}

pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, program: &str, path: &Path) -> std::io::Result<()> {
        Command::new(program).arg(path).spawn().map(|_| ())
    }
}

/// Candidate programs for `os` (as in `std::env::consts::OS`).
pub fn file_manager_commands(os: &str) -> Result<&'static [&'static str], LaunchError> {
    match os {
        "macos" => Ok(&["open"]),
        "windows" => Ok(&["explorer"]),
        "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Ok(&LINUX_FILE_MANAGERS),
        other => Err(LaunchError::UnsupportedPlatform(other.to_string())),
    }
}

/// Open `path` in the platform file manager; returns the program used.
pub fn open_folder(launcher: &dyn Launcher, path: &Path) -> Result<&'static str, LaunchError> {
    open_folder_on(std::env::consts::OS, launcher, path)
}

pub fn open_folder_on(
    os: &str,
    launcher: &dyn Launcher,
    path: &Path,
) -> Result<&'static str, LaunchError> {
    if !path.exists() {
        return Err(LaunchError::NotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(LaunchError::NotADirectory(path.display().to_string()));
    }

    let mut failures = Vec::new();
    for &program in file_manager_commands(os)? {
        match launcher.launch(program, path) {
            Ok(()) => {
                tracing::info!("opened {} with {program}", path.display());
                return Ok(program);
            }
            Err(e) => {
                tracing::debug!("{program} failed to open {}: {e}", path.display());
                failures.push(format!("{program}: {e}"));
            }
        }
    }
    Err(LaunchError::NoFileManager {
        path: path.display().to_string(),
        detail: failures.join("; "),
    })
}

// ---------------------------------------------------------------------------
// Dialogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Folder,
    File,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialogRequest {
    #[serde(default)]
    pub initial_dir: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// `(label, "*.yaml *.yml")` pairs.
    #[serde(default)]
    pub file_types: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogSelection {
    pub path: Option<String>,
    pub cancelled: bool,
}

impl DialogSelection {
    fn from_pick(picked: Option<PathBuf>) -> Self {
        match picked {
            Some(path) if !path.as_os_str().is_empty() => Self {
                path: Some(path.to_string_lossy().to_string()),
                cancelled: false,
            },
            _ => Self {
                path: None,
                cancelled: true,
            },
        }
    }
}

/// Blocking native dialogs. Called from a blocking thread.
pub trait FileDialogs: Send + Sync + 'static {
    fn pick(&self, kind: DialogKind, request: &DialogRequest, start_dir: &Path) -> Option<PathBuf>;
}

pub struct NativeDialogs;

impl FileDialogs for NativeDialogs {
    fn pick(&self, kind: DialogKind, request: &DialogRequest, start_dir: &Path) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().set_directory(start_dir);
        if let Some(title) = request.title.as_deref().filter(|t| !t.trim().is_empty()) {
            dialog = dialog.set_title(title);
        }
        match kind {
            DialogKind::Folder => dialog.pick_folder(),
            DialogKind::File => {
                for (label, patterns) in &request.file_types {
                    let extensions = pattern_extensions(patterns);
                    if !extensions.is_empty() {
                        dialog = dialog.add_filter(label.as_str(), extensions.as_slice());
                    }
                }
                dialog.pick_file()
            }
        }
    }
}

/// `"*.yaml *.yml"` -> `["yaml", "yml"]`; `"*"` and `"*.*"` match everything
/// and yield nothing.
pub fn pattern_extensions(patterns: &str) -> Vec<String> {
    patterns
        .split(|c: char| c.is_whitespace() || c == ';' || c == ',')
        .filter_map(|pattern| {
            let ext = pattern.trim().trim_start_matches('*').trim_start_matches('.');
            if ext.is_empty() || ext == "*" {
                None
            } else {
                Some(ext.to_string())
            }
        })
        .collect()
}

/// The requested directory when it exists, else the user's home.
pub fn resolve_start_dir(initial_dir: Option<&str>) -> PathBuf {
    if let Some(dir) = initial_dir.map(str::trim).filter(|d| !d.is_empty()) {
        let candidate = PathBuf::from(dir);
        if candidate.is_dir() {
            return candidate;
        }
    }
    crate::config::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Run a dialog on the blocking pool, giving up after `timeout`.
pub async fn browse(
    dialogs: Arc<dyn FileDialogs>,
    kind: DialogKind,
    request: DialogRequest,
    timeout: Duration,
) -> Result<DialogSelection, DialogError> {
    let start_dir = resolve_start_dir(request.initial_dir.as_deref());
    let task = tokio::task::spawn_blocking(move || dialogs.pick(kind, &request, &start_dir));
    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(DialogError::Timeout(timeout.as_secs())),
        Ok(Err(join_error)) => Err(DialogError::Failed(join_error.to_string())),
        Ok(Ok(picked)) => Ok(DialogSelection::from_pick(picked)),
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Records launches; programs listed in `failing` return an error.
    #[derive(Default)]
    pub struct RecordingLauncher {
        pub failing: Vec<&'static str>,
        pub launched: Mutex<Vec<String>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, program: &str, _path: &Path) -> std::io::Result<()> {
            self.launched.lock().unwrap().push(program.to_string());
            if self.failing.iter().any(|failing| *failing == program) {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            } else {
                Ok(())
            }
        }
    }

    pub struct FixedDialogs {
        pub answer: Option<PathBuf>,
        pub delay: Duration,
    }

    impl FileDialogs for FixedDialogs {
        fn pick(&self, _kind: DialogKind, _request: &DialogRequest, _start: &Path) -> Option<PathBuf> {
            std::thread::sleep(self.delay);
            self.answer.clone()
        }
    }
}
