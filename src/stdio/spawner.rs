//! Backend process spawner and supervisor.
//!
//! Spawns the backend with:
//! - the adapter's environment inherited, plus any configured overrides,
//! - stdin, stdout and stderr piped,
//! - `kill_on_drop(true)` so the process cannot outlive its handle.
//!
//! [`supervise`] then owns the [`Child`] for the rest of its life: it notices
//! an unexpected exit, and on cancellation gives the backend a grace period
//! to exit on its own (stdin has been closed by then) before killing it.
//! Either way it closes the pending table, which releases every waiting
//! caller, and reports [`DictionaryFault::Terminated`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::faults::{self, DictionaryFault, FaultSender};
use crate::stdio::channel::PendingTable;
use crate::{AppError, Result};

/// Default bound on the handshake read.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time a backend gets to exit after stdin is closed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ── Configuration ────────────────────────────────────────────────────────────

/// How to launch a backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Program to execute.
    pub command: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Variables added to (or overriding) the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Working directory; inherits the adapter's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Bound on waiting for the handshake line; `None` waits forever.
    pub startup_timeout: Option<Duration>,
    /// Time allowed for a graceful exit before the process is killed.
    pub shutdown_grace: Duration,
}

impl SpawnConfig {
    /// Launch `command` with no arguments and default timeouts.
    #[must_use]
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            startup_timeout: Some(DEFAULT_STARTUP_TIMEOUT),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set one environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Name used to attribute logs and faults: the command's file name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.command.file_name().map_or_else(
            || self.command.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A freshly spawned backend with its three streams detached.
#[derive(Debug)]
pub struct BackendProcess {
    /// Child process handle (`kill_on_drop`).
    pub child: Child,
    /// Backend's stdin, for requests.
    pub stdin: ChildStdin,
    /// Backend's stdout, for the handshake and responses.
    pub stdout: ChildStdout,
    /// Backend's stderr, for diagnostics.
    pub stderr: ChildStderr,
}

/// Spawn the backend described by `config`.
///
/// # Errors
///
/// - `AppError::Startup("failed to spawn …")`: OS spawn failure.
/// - `AppError::Startup("failed to capture …")`: a pipe was not set up.
pub fn spawn_backend(config: &SpawnConfig) -> Result<BackendProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args).envs(&config.env);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Startup(format!(
            "failed to spawn {}: {err}",
            config.command.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Startup("failed to capture backend stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Startup("failed to capture backend stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Startup("failed to capture backend stderr".into()))?;

    info!(
        command = %config.command.display(),
        pid = child.id(),
        "backend process spawned"
    );

    Ok(BackendProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Spawn the task that owns `child` until it exits.
///
/// - Unexpected exit: closes `pending` with the exit reason.
/// - `cancel` fired: waits up to `grace` for the exit, then kills.
///
/// In both cases it reports one [`DictionaryFault::Terminated`].
#[must_use]
pub fn supervise(
    dictionary: String,
    mut child: Child,
    pending: PendingTable,
    faults: FaultSender,
    cancel: CancellationToken,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (exit_code, reason) = tokio::select! {
            result = child.wait() => {
                let (code, reason) = describe_exit(result);
                warn!(dictionary, reason = reason.as_str(), "backend process exited");
                (code, reason)
            }
            () = cancel.cancelled() => {
                info!(dictionary, ?grace, "waiting for backend to exit");
                let (code, how) = terminate(&dictionary, &mut child, grace).await;
                (code, format!("{dictionary} was shut down ({how})"))
            }
        };

        pending.close(&reason).await;
        faults::report(
            &faults,
            DictionaryFault::Terminated {
                dictionary,
                exit_code,
                reason,
            },
        );
    })
}

/// Graceful-then-forced termination; returns the exit code and a summary.
async fn terminate(dictionary: &str, child: &mut Child, grace: Duration) -> (Option<i32>, String) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => {
            let (code, reason) = describe_exit(result);
            info!(dictionary, reason = reason.as_str(), "backend exited gracefully");
            (code, reason)
        }
        Err(_) => {
            warn!(
                dictionary,
                "backend did not exit within grace period, forcing kill"
            );
            if let Err(err) = child.kill().await {
                warn!(dictionary, %err, "failed to force-kill backend");
            }
            (None, "killed after grace period".to_owned())
        }
    }
}

fn describe_exit(result: std::io::Result<ExitStatus>) -> (Option<i32>, String) {
    match result {
        Ok(status) => {
            let code = status.code();
            let reason = code.map_or_else(
                || "process terminated by signal".to_owned(),
                |c| format!("process exited with code {c}"),
            );
            (code, reason)
        }
        Err(err) => (None, format!("wait error: {err}")),
    }
}
