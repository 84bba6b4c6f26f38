//! External command execution bounded by timeout classes.
//!
//! Every host and git operation goes through the [`Executor`] trait so that
//! the host lifecycle manager and the repository synchronizer can be driven
//! by a scripted executor in tests. [`SystemExecutor`] is the production
//! implementation.
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ExecError;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Timeout class of an external command.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use quadsync::exec::Timeout;
///
/// assert_eq!(Timeout::Short.duration(), Duration::from_secs(30));
/// assert_eq!(Timeout::Service.duration(), Duration::from_secs(90));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Metadata lookups: `id`, `getent`, `git rev-parse`.
    Short,
    /// User and file mutations: `useradd`, `userdel`, `loginctl`, `chown`, `git reset`.
    Default,
    /// Network-bound git operations: `git clone`, `git fetch`.
    Network,
    /// `systemctl` operations; stopping a container can be slow.
    Service,
}

impl Timeout {
    /// The wall-clock limit for this class.
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(30),
            Self::Default => Duration::from_secs(60),
            Self::Network => Duration::from_secs(120),
            Self::Service => Duration::from_secs(90),
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Abstraction over running external programs.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command, capturing its output. Fails on non-zero exit or timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`], [`ExecError::TimedOut`] or [`ExecError::Failed`].
    fn run(&self, timeout: Timeout, program: &str, args: &[&str]) -> Result<ExecResult, ExecError>;

    /// Run a command in a specific working directory.
    ///
    /// # Errors
    ///
    /// Same as [`Executor::run`].
    fn run_in(
        &self,
        dir: &Path,
        timeout: Timeout,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError>;

    /// Run a command with stdout/stderr inherited from this process.
    ///
    /// Used for `systemctl --user -M`, whose machine transport misbehaves when
    /// its output is piped.
    ///
    /// # Errors
    ///
    /// Same as [`Executor::run`]; a failure carries no captured output.
    fn run_inherited(&self, timeout: Timeout, program: &str, args: &[&str])
    -> Result<(), ExecError>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, timeout: Timeout, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        execute_captured(cmd, render(program, args), timeout.duration())
    }

    fn run_in(
        &self,
        dir: &Path,
        timeout: Timeout,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        execute_captured(cmd, render(program, args), timeout.duration())
    }

    fn run_inherited(
        &self,
        timeout: Timeout,
        program: &str,
        args: &[&str],
    ) -> Result<(), ExecError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        execute_inherited(cmd, render(program, args), timeout.duration())
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Render a command line for error messages.
fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Spawn with piped output, drain both pipes, and enforce `limit`.
fn execute_captured(
    mut cmd: Command,
    command: String,
    limit: Duration,
) -> Result<ExecResult, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: command.clone(),
        source,
    })?;

    // Pipes are drained on helper threads so a chatty child cannot fill the
    // pipe buffer and stall before the deadline.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, limit) {
        Ok(Some(status)) => status,
        Ok(None) => {
            return Err(ExecError::TimedOut {
                command,
                timeout: limit,
            });
        }
        Err(source) => return Err(ExecError::Spawn { command, source }),
    };

    let result = ExecResult {
        stdout: collect(stdout),
        stderr: collect(stderr),
        success: status.success(),
        code: status.code(),
    };
    if !result.success {
        return Err(ExecError::Failed {
            command,
            code: result.code,
            output: result.combined(),
        });
    }
    Ok(result)
}

fn execute_inherited(mut cmd: Command, command: String, limit: Duration) -> Result<(), ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: command.clone(),
        source,
    })?;
    match wait_with_deadline(&mut child, limit) {
        Ok(Some(status)) if status.success() => Ok(()),
        Ok(Some(status)) => Err(ExecError::Failed {
            command,
            code: status.code(),
            output: String::new(),
        }),
        Ok(None) => Err(ExecError::TimedOut {
            command,
            timeout: limit,
        }),
        Err(source) => Err(ExecError::Spawn { command, source }),
    }
}

/// Poll `child` until it exits or `limit` elapses.
///
/// Returns `Ok(None)` on timeout after killing and reaping the child.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // Best-effort: the child may exit between try_wait and kill.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
