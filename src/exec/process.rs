// src/exec/process.rs

//! Subprocess execution with a watchdog.
//!
//! [`ProcessExecutor`] runs `EXECUTE` actions. The lower-level
//! [`run_with_watchdog`] is shared with the remote exec daemon, which runs
//! the commands it receives the same way but keeps their stdout.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exec::backend::{ActionExecutor, ActionFuture};
use crate::fs::FileSystem;
use crate::remote::{RemoteExecBootstrap, RemoteExecClient, RemoteExecError};
use crate::signal::{ActionFailure, Outcome};

/// Pause before the single retry of a launch that hit a transient error.
pub const LAUNCH_RETRY_DELAY: Duration = Duration::from_millis(10);

/// How long to wait for captured stdout to drain once the child has exited.
const STDOUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// A command line split on whitespace.
///
/// Quoting is not supported: an argument can never contain a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?.to_string();
        Some(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn program_path(&self) -> &Path {
        Path::new(&self.program)
    }

    /// Absolute program paths must exist and be executable; relative names
    /// are left to `PATH` lookup at spawn time.
    pub fn check_executable(&self, fs: &dyn FileSystem) -> Result<(), PathBuf> {
        let path = self.program_path();
        if path.is_absolute() && !fs.is_executable(path) {
            return Err(path.to_path_buf());
        }
        Ok(())
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a watched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEnd {
    /// Exit code; -1 when the process died from a signal.
    Exited(i32),
    /// Killed by the watchdog.
    TimedOut,
    /// Killed because the caller cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRun {
    pub end: ProcessEnd,
    /// Captured stdout (empty unless capture was requested).
    pub stdout: String,
}

/// Launch errors worth one retry: the OS refused a fork/exec for a reason
/// that usually clears within milliseconds.
pub fn is_transient_launch_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::ExecutableFileBusy
    )
}

/// Call `spawn`, retrying exactly once after [`LAUNCH_RETRY_DELAY`] if the
/// first attempt failed transiently. The second error is returned as is.
pub async fn spawn_with_retry<T, F>(mut spawn: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    match spawn() {
        Ok(child) => Ok(child),
        Err(e) if is_transient_launch_error(&e) => {
            debug!(error = %e, "transient launch failure; retrying once");
            tokio::time::sleep(LAUNCH_RETRY_DELAY).await;
            let child = spawn()?;
            info!(first_error = %e, "command launched on retry");
            Ok(child)
        }
        Err(e) => Err(e),
    }
}

/// Run `cmd` to completion, killing it when `delay` elapses (zero disables
/// the watchdog) or `cancel` fires.
///
/// Stdin and stderr are always discarded; stdout is captured when
/// `capture_stdout` is set, discarded otherwise. The child and any reader
/// task are gone when this returns.
pub async fn run_with_watchdog(
    cmd: &CommandLine,
    delay: Duration,
    capture_stdout: bool,
    cancel: &CancellationToken,
) -> io::Result<ProcessRun> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = spawn_with_retry(|| command.spawn()).await?;

    let reader = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let end = tokio::select! {
        status = child.wait() => ProcessEnd::Exited(status?.code().unwrap_or(-1)),
        _ = watchdog(delay) => {
            kill(&mut child, cmd).await;
            ProcessEnd::TimedOut
        }
        _ = cancel.cancelled() => {
            kill(&mut child, cmd).await;
            ProcessEnd::Cancelled
        }
    };

    let stdout = match reader {
        Some(mut handle) if matches!(end, ProcessEnd::Exited(_)) => {
            match tokio::time::timeout(STDOUT_DRAIN_LIMIT, &mut handle).await {
                Ok(Ok(out)) => out,
                _ => {
                    handle.abort();
                    String::new()
                }
            }
        }
        Some(handle) => {
            handle.abort();
            String::new()
        }
        None => String::new(),
    };

    Ok(ProcessRun { end, stdout })
}

async fn watchdog(delay: Duration) {
    if delay.is_zero() {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

async fn kill(child: &mut Child, cmd: &CommandLine) {
    if let Err(e) = child.kill().await {
        warn!(command = %cmd, error = %e, "failed to kill child process");
    }
}

/// Runs `EXECUTE` actions, locally or through the remote exec daemon.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    fs: Arc<dyn FileSystem>,
    remote: Option<Arc<RemoteExecBootstrap>>,
}

impl ProcessExecutor {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, remote: None }
    }

    /// Delegate every command to the remote exec daemon when it is
    /// reachable.
    pub fn with_remote(mut self, bootstrap: Arc<RemoteExecBootstrap>) -> Self {
        self.remote = Some(bootstrap);
        self
    }

    pub fn uses_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn run(&self, command: &str, delay: Duration, cancel: &CancellationToken) -> Outcome {
        if let Some(bootstrap) = &self.remote {
            let mut client = RemoteExecClient::new(Arc::clone(bootstrap));
            match client.connect(delay, cancel).await {
                Ok(()) => {
                    let outcome = client.run_one_command(command, delay, cancel).await;
                    client.disconnect().await;
                    return outcome;
                }
                Err(RemoteExecError::Cancelled) => {
                    info!(command, "exec cancelled while connecting to remote exec daemon");
                    return Outcome::Failure(ActionFailure::Cancelled);
                }
                Err(RemoteExecError::SessionsBusy(_)) => {
                    error!(
                        command,
                        delay_ms = delay.as_millis() as u64,
                        "exec is in time out waiting for a remote session"
                    );
                    return Outcome::Failure(ActionFailure::Timeout(delay));
                }
                Err(e) => {
                    warn!(error = %e, "remote exec daemon unavailable; running command locally");
                }
            }
        }

        let Some(cmd) = CommandLine::parse(command) else {
            error!("empty command line for EXECUTE action");
            return Outcome::Failure(ActionFailure::Validation("empty command line".into()));
        };

        if let Err(path) = cmd.check_executable(self.fs.as_ref()) {
            error!(program = %path.display(), "exec command is not executable");
            return Outcome::Failure(ActionFailure::NotExecutable(path));
        }

        info!(command = %cmd, delay_ms = delay.as_millis() as u64, "starting command");

        let run = match run_with_watchdog(&cmd, delay, false, cancel).await {
            Ok(run) => run,
            Err(e) => {
                error!(command = %cmd, error = %e, "cannot execute command");
                return Outcome::Failure(ActionFailure::LaunchFailed(e.to_string()));
            }
        };

        match run.end {
            ProcessEnd::Exited(code) => {
                let outcome = Outcome::from_status(code, ActionFailure::NonZeroExit);
                match &outcome {
                    Outcome::Success => info!(command = %cmd, "exec OK"),
                    Outcome::SuccessWithWarning => warn!(command = %cmd, "exec in warning"),
                    Outcome::Failure(_) => {
                        error!(command = %cmd, exit_code = code, "exec in error")
                    }
                }
                outcome
            }
            ProcessEnd::TimedOut => {
                error!(command = %cmd, delay_ms = delay.as_millis() as u64, "exec is in time out");
                Outcome::Failure(ActionFailure::Timeout(delay))
            }
            ProcessEnd::Cancelled => {
                info!(command = %cmd, "exec cancelled; process killed");
                Outcome::Failure(ActionFailure::Cancelled)
            }
        }
    }
}

impl ActionExecutor for ProcessExecutor {
    fn execute(
        &self,
        command: String,
        delay: Duration,
        cancel: CancellationToken,
    ) -> ActionFuture<'_> {
        Box::pin(async move { self.run(&command, delay, &cancel).await })
    }
}
