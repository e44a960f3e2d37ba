//! Negotiation sessions: each one is a child process running the external
//! `negotiate` command with arguments built from [`NegotiationParams`].

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::params::NegotiationParams;

pub const OUTPUT_TAIL_LINES: usize = 200;
/// Finished sessions kept for listing; older ones are dropped.
pub const MAX_FINISHED_SESSIONS: usize = 100;
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("no negotiate command configured")]
    EmptyCommand,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("negotiation session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationSessionView {
    pub id: String,
    pub status: SessionStatus,
    /// Full command line, program first.
    pub command: Vec<String>,
    pub save_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// Last lines of combined stdout and stderr.
    pub output_tail: VecDeque<String>,
    pub error: Option<String>,
}

/// Starts the negotiation process. Swappable so tests can run a shell
/// script instead of the real command.
pub trait NegotiationSpawner: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child>;
}

pub struct CommandSpawner;

impl NegotiationSpawner for CommandSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child> {
        TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
    }
}

struct SessionEntry {
    view: NegotiationSessionView,
    output: Arc<Mutex<VecDeque<String>>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl SessionEntry {
    fn snapshot(&self) -> NegotiationSessionView {
        let mut view = self.view.clone();
        if let Ok(output) = self.output.lock() {
            view.output_tail = output.clone();
        }
        view
    }
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

pub struct NegotiationRegistry {
    program: String,
    base_args: Vec<String>,
    spawner: Arc<dyn NegotiationSpawner>,
    sessions: Arc<DashMap<String, SessionEntry>>,
    max_finished: usize,
}

impl NegotiationRegistry {
    /// `command` is split on whitespace: the first word is the program, the
    /// rest come before the generated arguments.
    pub fn new(command: &str) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        Self::with_spawner(program, words.collect(), Arc::new(CommandSpawner))
    }

    pub fn with_spawner(
        program: impl Into<String>,
        base_args: Vec<String>,
        spawner: Arc<dyn NegotiationSpawner>,
    ) -> Self {
        Self {
            program: program.into(),
            base_args,
            spawner,
            sessions: Arc::new(DashMap::new()),
            max_finished: MAX_FINISHED_SESSIONS,
        }
    }

    pub fn with_max_finished(mut self, max_finished: usize) -> Self {
        self.max_finished = max_finished;
        self
    }

    /// The arguments a session for `params` would run with.
    pub fn command_line(&self, params: &NegotiationParams) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.base_args.iter().cloned())
            .chain(params.to_cli_args())
            .collect()
    }

    /// Spawn a session. Without a save path the results go to
    /// `<negotiations_dir>/<session id>`.
    pub fn start(
        &self,
        mut params: NegotiationParams,
        negotiations_dir: &Path,
    ) -> Result<NegotiationSessionView, RunnerError> {
        if self.program.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }

        let id = Uuid::new_v4().to_string();
        if !params.has_save_path() {
            params.save_path = Some(negotiations_dir.join(&id).to_string_lossy().to_string());
        }
        let command = self.command_line(&params);

        let mut child = self
            .spawner
            .spawn(&self.program, &command[1..])
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        tracing::info!(session = %id, "started negotiation: {}", command.join(" "));

        let output = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(capture_lines(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(capture_lines(stderr, output.clone()));
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let view = NegotiationSessionView {
            id: id.clone(),
            status: SessionStatus::Running,
            command,
            save_path: params.save_path.clone(),
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            output_tail: VecDeque::new(),
            error: None,
        };
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                view: view.clone(),
                output,
                cancel: Some(cancel_tx),
            },
        );

        let sessions = self.sessions.clone();
        tokio::spawn(monitor(id, child, cancel_rx, readers, sessions, self.max_finished));
        Ok(view)
    }

    pub fn get(&self, id: &str) -> Option<NegotiationSessionView> {
        self.sessions.get(id).map(|entry| entry.snapshot())
    }

    /// Newest first.
    pub fn list(&self) -> Vec<NegotiationSessionView> {
        let mut views: Vec<_> = self.sessions.iter().map(|entry| entry.snapshot()).collect();
        views.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        views
    }

    /// Ask a running session to stop. Finished sessions are returned as is.
    pub fn cancel(&self, id: &str) -> Result<NegotiationSessionView, RunnerError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RunnerError::NotFound(id.to_string()))?;
        if let Some(cancel) = entry.cancel.take() {
            tracing::info!(session = %id, "cancelling negotiation");
            let _ = cancel.send(());
        }
        Ok(entry.snapshot())
    }
}

fn capture_lines<R>(stream: R, output: Arc<Mutex<VecDeque<String>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut buffer) = output.lock() {
                if buffer.len() >= OUTPUT_TAIL_LINES {
                    buffer.pop_front();
                }
                buffer.push_back(line);
            }
        }
    })
}

async fn monitor(
    id: String,
    mut child: Child,
    cancel_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    sessions: Arc<DashMap<String, SessionEntry>>,
    max_finished: usize,
) {
    let ending = tokio::select! {
        status = child.wait() => Ending::Exited(status),
        Ok(()) = cancel_rx => Ending::Cancelled,
    };

    let (status, exit_code, error) = match ending {
        Ending::Cancelled => {
            if let Err(e) = child.kill().await {
                tracing::warn!(session = %id, "failed to kill negotiation: {e}");
            }
            (SessionStatus::Cancelled, None, None)
        }
        Ending::Exited(Ok(exit)) if exit.success() => (SessionStatus::Completed, exit.code(), None),
        Ending::Exited(Ok(exit)) => (
            SessionStatus::Failed,
            exit.code(),
            Some(format!("negotiate exited with {exit}")),
        ),
        Ending::Exited(Err(e)) => (SessionStatus::Failed, None, Some(e.to_string())),
    };

    for reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
            tracing::debug!(session = %id, "output reader still open after exit");
        }
    }

    match status {
        SessionStatus::Completed => tracing::info!(session = %id, "negotiation completed"),
        _ => tracing::warn!(session = %id, ?status, "negotiation ended: {}", error.as_deref().unwrap_or("cancelled")),
    }

    if let Some(mut entry) = sessions.get_mut(&id) {
        entry.cancel = None;
        entry.view.status = status;
        entry.view.exit_code = exit_code;
        entry.view.error = error;
        entry.view.finished_at = Some(Utc::now());
    }
    prune_finished(&sessions, max_finished);
}

/// Drop the oldest finished sessions beyond `keep`. Running sessions stay.
fn prune_finished(sessions: &DashMap<String, SessionEntry>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = sessions
        .iter()
        .filter_map(|entry| entry.view.finished_at.map(|at| (at, entry.key().clone())))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, id) in finished.into_iter().skip(keep) {
        sessions.remove(&id);
        tracing::debug!(session = %id, "dropped finished negotiation");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn shell(script: &str) -> NegotiationRegistry {
        NegotiationRegistry::with_spawner(
            "sh",
            vec!["-c".into(), script.into(), "negotiate".into()],
            Arc::new(CommandSpawner),
        )
    }

    async fn wait_until_done(registry: &NegotiationRegistry, id: &str) -> NegotiationSessionView {
        for _ in 0..200 {
            let view = registry.get(id).unwrap();
            if view.status != SessionStatus::Running {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("session {id} did not finish");
    }

    #[tokio::test]
    async fn test_completed_session_captures_output() {
        let tmp = TempDir::new().unwrap();
        let registry = shell("echo \"$@\"; echo done >&2");
        let mut params = NegotiationParams::default();
        params.steps = Some(10);

        let started = registry.start(params, tmp.path()).unwrap();
        assert_eq!(started.status, SessionStatus::Running);
        let expected_save = tmp.path().join(&started.id).to_string_lossy().to_string();
        assert_eq!(started.save_path.as_deref(), Some(expected_save.as_str()));

        let done = wait_until_done(&registry, &started.id).await;
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.exit_code, Some(0));
        assert!(done.finished_at.is_some());
        assert!(done.output_tail.iter().any(|line| line.contains("--steps 10")));
        assert!(done.output_tail.iter().any(|line| line.contains("--save-path")));
        assert!(done.output_tail.iter().any(|line| line == "done"));
    }

    #[tokio::test]
    async fn test_failed_session_records_exit_code() {
        let tmp = TempDir::new().unwrap();
        let registry = shell("exit 3");
        let started = registry.start(NegotiationParams::default(), tmp.path()).unwrap();
        let done = wait_until_done(&registry, &started.id).await;
        assert_eq!(done.status, SessionStatus::Failed);
        assert_eq!(done.exit_code, Some(3));
        assert!(done.error.is_some());
    }

    #[tokio::test]
    async fn test_cancel_running_session() {
        let tmp = TempDir::new().unwrap();
        let registry = shell("exec sleep 30");
        let started = registry.start(NegotiationParams::default(), tmp.path()).unwrap();

        registry.cancel(&started.id).unwrap();
        let done = wait_until_done(&registry, &started.id).await;
        assert_eq!(done.status, SessionStatus::Cancelled);
        assert_eq!(done.exit_code, None);

        assert!(matches!(registry.cancel("missing"), Err(RunnerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_keeps_explicit_save_path_and_lists_sessions() {
        let tmp = TempDir::new().unwrap();
        let registry = shell("true");
        let mut params = NegotiationParams::default();
        params.save_path = Some("/tmp/elsewhere".into());

        let started = registry.start(params, tmp.path()).unwrap();
        assert_eq!(started.save_path.as_deref(), Some("/tmp/elsewhere"));
        assert_eq!(&started.command[..3], &["sh", "-c", "true"]);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_sessions_are_pruned() {
        let tmp = TempDir::new().unwrap();
        let registry = shell("true").with_max_finished(2);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let started = registry.start(NegotiationParams::default(), tmp.path()).unwrap();
            wait_until_done(&registry, &started.id).await;
            ids.push(started.id);
        }
        for _ in 0..200 {
            if registry.list().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let kept: Vec<String> = registry.list().into_iter().map(|view| view.id).collect();
        assert_eq!(kept.len(), 2);
        assert!(registry.get(&ids[0]).is_none());
        assert!(kept.contains(&ids[2]));
    }

    #[tokio::test]
    async fn test_spawn_errors() {
        let tmp = TempDir::new().unwrap();
        let empty = NegotiationRegistry::new("   ");
        assert!(matches!(
            empty.start(NegotiationParams::default(), tmp.path()),
            Err(RunnerError::EmptyCommand)
        ));

        let missing = NegotiationRegistry::new("definitely-not-a-negotiate-binary");
        assert!(matches!(
            missing.start(NegotiationParams::default(), tmp.path()),
            Err(RunnerError::Spawn { .. })
        ));
        assert!(missing.list().is_empty());
    }
}
