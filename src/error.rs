//! Domain-specific error types for the quadlet reconciler.
//!
//! Each layer returns its own [`thiserror`] enum; command handlers at the CLI
//! boundary convert them to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ReconcileError
//! ├── Sync(SyncError)   : git clone / fetch / reset
//! ├── State(StateError) : persisted hash record
//! ├── Build(BuildError) : duplicate names, unreadable tree
//! │   └── ParseError    : malformed unit or transform file
//! ├── Host(HostError)   : user, manager, quadlet operations
//! │   └── ExecError     : external command spawn / timeout / exit
//! └── Failed            : aggregate of per-name failures
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A malformed line in a unit or transform file.
///
/// Line numbers are 1-based and refer to the physical line that could not
/// be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A `Key=Value` entry appeared before the first section header.
    #[error("line {line}: entry outside of any section: {text}")]
    OutsideSection {
        /// 1-based line number.
        line: usize,
        /// Offending line, without its terminator.
        text: String,
    },

    /// A line starting with `[` is not a well-formed, non-empty header.
    #[error("line {line}: malformed section header: {text}")]
    BadHeader {
        /// 1-based line number.
        line: usize,
        /// Offending line, without its terminator.
        text: String,
    },

    /// A line is neither blank, a comment, a header nor `Key=Value`.
    #[error("line {line}: expected Key=Value: {text}")]
    NotKeyValue {
        /// 1-based line number.
        line: usize,
        /// Offending line, without its terminator.
        text: String,
    },

    /// The text before `=` is empty.
    #[error("line {line}: empty key: {text}")]
    EmptyKey {
        /// 1-based line number.
        line: usize,
        /// Offending line, without its terminator.
        text: String,
    },
}

/// Errors that make the desired state (or a single augment) unbuildable.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Two sources resolve to the same deployment name.
    #[error("duplicate container name '{name}': {} and {}", .first.display(), .second.display())]
    DuplicateName {
        /// The colliding deployment name.
        name: String,
        /// Source that claimed the name first.
        first: PathBuf,
        /// Source that tried to claim it again.
        second: PathBuf,
    },

    /// Two transform files share the same stem.
    #[error("duplicate transform '{name}': {} and {}", .first.display(), .second.display())]
    DuplicateTransform {
        /// The colliding transform name.
        name: String,
        /// First transform file.
        first: PathBuf,
        /// Second transform file.
        second: PathBuf,
    },

    /// A directory or file in the input tree could not be read.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A unit file could not be parsed.
    #[error("{}: {source}", .path.display())]
    Parse {
        /// Path of the unit file.
        path: PathBuf,
        /// Underlying parse error.
        source: ParseError,
    },

    /// No transform is keyed by the unit's directory name.
    #[error("no transform matches directory '{directory}'")]
    NoTransform {
        /// Directory name that was looked up.
        directory: String,
    },

    /// The transform selected for a directory failed to parse.
    #[error("transform '{name}' is invalid: {source}")]
    BrokenTransform {
        /// Transform name (directory name).
        name: String,
        /// Underlying parse error.
        source: ParseError,
    },
}

/// Errors from running an external command.
///
/// A timeout is reported separately from a non-zero exit so callers can tell
/// an unresponsive host from a rejected operation.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started (or waited on).
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The command exceeded its timeout class and was killed.
    #[error("command timed out after {}s: {command}", .timeout.as_secs())]
    TimedOut {
        /// Rendered command line.
        command: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// The command exited unsuccessfully.
    #[error("{command} failed ({}): {}", exit_label(.code), .output.trim())]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured stdout followed by stderr (empty for inherited output).
        output: String,
    },
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}"))
}

impl ExecError {
    /// Captured output of a failed command, if any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Exit code of a failed command, if it exited normally.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Errors raised by the host lifecycle manager.
#[derive(Error, Debug)]
pub enum HostError {
    /// An external command exceeded its timeout class.
    #[error("{operation} for '{user}' timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Managed user the operation concerned.
        user: String,
        /// Short operation label (e.g. `"create user"`).
        operation: &'static str,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// An external command failed; not retried.
    #[error("{operation} for '{user}' failed: {source}")]
    Command {
        /// Managed user the operation concerned.
        user: String,
        /// Short operation label.
        operation: &'static str,
        /// Underlying command error.
        source: ExecError,
    },

    /// The per-user systemd instance did not expose its bus socket.
    #[error("user manager for '{user}' not ready: {} missing", .socket.display())]
    ManagerNotReady {
        /// Managed user.
        user: String,
        /// Socket path that never appeared.
        socket: PathBuf,
    },

    /// A transient failure persisted through every retry attempt.
    #[error("{operation} for '{user}' still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Managed user.
        user: String,
        /// Short operation label.
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: ExecError,
    },

    /// A filesystem operation under the user's home failed.
    #[error("{operation} for '{user}': {}: {source}", .path.display())]
    Io {
        /// Managed user.
        user: String,
        /// Short operation label.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A lookup command succeeded but its output could not be interpreted.
    #[error("unexpected output from {operation} for '{user}': {output}")]
    Lookup {
        /// Managed user (or group).
        user: String,
        /// Short operation label.
        operation: &'static str,
        /// The output that could not be parsed.
        output: String,
    },
}

impl HostError {
    /// Classify a command error for `user`, keeping timeouts distinct.
    #[must_use]
    pub fn from_exec(user: &str, operation: &'static str, err: ExecError) -> Self {
        match err {
            ExecError::TimedOut { timeout, .. } => Self::Timeout {
                user: user.to_string(),
                operation,
                timeout,
            },
            source => Self::Command {
                user: user.to_string(),
                operation,
                source,
            },
        }
    }

    /// Returns `true` if the failure was a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from the git repository synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A git command failed or timed out.
    #[error("git {step} failed: {source}")]
    Git {
        /// The git step (`clone`, `fetch`, `rev-parse`, `reset`).
        step: &'static str,
        /// Underlying command error.
        source: ExecError,
    },

    /// The working directory could not be prepared.
    #[error("preparing {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from the persisted hash record.
#[derive(Error, Debug)]
pub enum StateError {
    /// The state file exists but could not be read.
    #[error("reading state {}: {source}", .path.display())]
    Read {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The state file could not be written or renamed into place.
    #[error("writing state {}: {source}", .path.display())]
    Write {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The state file is not valid JSON of the expected shape.
    #[error("decoding state {}: {source}", .path.display())]
    Decode {
        /// State file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The record could not be serialized.
    #[error("encoding state: {source}")]
    Encode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Errors that end a reconcile cycle.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Repository synchronization failed; nothing was applied.
    #[error("repository sync failed: {0}")]
    Sync(#[from] SyncError),

    /// The persisted record could not be loaded or saved.
    #[error("state store: {0}")]
    State(#[from] StateError),

    /// The desired state is ambiguous or unreadable.
    #[error("building desired state: {0}")]
    Build(#[from] BuildError),

    /// Managed users could not be listed.
    #[error("listing managed users: {0}")]
    Host(#[from] HostError),

    /// One or more deployment names failed; all others were applied.
    #[error("{} deployment(s) failed: {}", .names.len(), .names.join(", "))]
    Failed {
        /// Names that failed, in processing order.
        names: Vec<String>,
    },
}
