//! Bounded retry for teardown races.
//!
//! `userdel -r` fails while processes of the user are still exiting after
//! the user slice was stopped. Those failures are retried a fixed number of
//! times; everything else fails immediately.
use std::thread;
use std::time::Duration;

use crate::error::{ExecError, HostError};
use crate::logging::Log;

/// Output fragments that mark a failure as transient.
const TRANSIENT_MARKERS: &[&str] = &["busy", "currently used by process"];

/// Fixed-delay retry policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use quadsync::host::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 4);
/// assert_eq!(policy.delay, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause before every attempt after the first.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(5),
        }
    }
}

/// Whether `err` is worth retrying.
///
/// Only non-zero exits whose output mentions a busy resource qualify; a
/// timeout or spawn failure never does.
#[must_use]
pub fn is_transient(err: &ExecError) -> bool {
    match err {
        ExecError::Failed { output, .. } => {
            let output = output.to_lowercase();
            TRANSIENT_MARKERS.iter().any(|m| output.contains(m))
        }
        ExecError::Spawn { .. } | ExecError::TimedOut { .. } => false,
    }
}

/// Where the retry loop stands.
enum Step {
    Try(u32),
    Wait(u32, ExecError),
}

/// Run `op` under `policy`.
///
/// # Errors
///
/// Returns the first non-transient failure classified via
/// [`HostError::from_exec`], or [`HostError::RetriesExhausted`] carrying the
/// last transient failure.
pub fn with_retry<F>(
    policy: RetryPolicy,
    user: &str,
    operation: &'static str,
    log: &dyn Log,
    mut op: F,
) -> Result<(), HostError>
where
    F: FnMut() -> Result<(), ExecError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut step = Step::Try(1);
    loop {
        step = match step {
            Step::Try(n) => match op() {
                Ok(()) => return Ok(()),
                Err(e) if !is_transient(&e) => {
                    return Err(HostError::from_exec(user, operation, e));
                }
                Err(source) if n >= attempts => {
                    return Err(HostError::RetriesExhausted {
                        user: user.to_string(),
                        operation,
                        attempts: n,
                        source,
                    });
                }
                Err(e) => Step::Wait(n, e),
            },
            Step::Wait(n, e) => {
                log.warn(&format!(
                    "{operation} for '{user}' attempt {n}/{attempts} hit a transient failure, retrying in {}s: {e}",
                    policy.delay.as_secs()
                ));
                thread::sleep(policy.delay);
                Step::Try(n + 1)
            }
        };
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::CaptureLog;
    use std::cell::Cell;

    fn failed(output: &str) -> ExecError {
        ExecError::Failed {
            command: "userdel -r web".to_string(),
            code: Some(8),
            output: output.to_string(),
        }
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    // -----------------------------------------------------------------------
    // is_transient
    // -----------------------------------------------------------------------

    #[test]
    fn busy_output_is_transient() {
        assert!(is_transient(&failed("userdel: user web is currently used by process 4242")));
        assert!(is_transient(&failed("rm: cannot remove '/home/web': Device or resource BUSY")));
    }

    #[test]
    fn other_failures_are_not_transient() {
        assert!(!is_transient(&failed("userdel: user 'web' does not exist")));
        assert!(!is_transient(&ExecError::TimedOut {
            command: "userdel".to_string(),
            timeout: Duration::from_secs(60),
        }));
    }

    // -----------------------------------------------------------------------
    // with_retry
    // -----------------------------------------------------------------------

    #[test]
    fn succeeds_after_transient_failures() {
        let log = CaptureLog::default();
        let calls = Cell::new(0);
        let result = with_retry(quick(4), "web", "delete user", &log, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(failed("currently used by process 1"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
        assert_eq!(log.warnings().len(), 2, "one warning per retry");
    }

    #[test]
    fn exhaustion_is_reported() {
        let log = CaptureLog::default();
        let calls = Cell::new(0);
        let err = with_retry(quick(4), "web", "delete user", &log, || {
            calls.set(calls.get() + 1);
            Err(failed("device busy"))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 4);
        assert!(
            matches!(err, HostError::RetriesExhausted { attempts: 4, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn non_transient_fails_immediately() {
        let log = CaptureLog::default();
        let calls = Cell::new(0);
        let err = with_retry(quick(4), "web", "delete user", &log, || {
            calls.set(calls.get() + 1);
            Err(failed("permission denied"))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, HostError::Command { .. }));
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn timeout_is_not_retried() {
        let log = CaptureLog::default();
        let calls = Cell::new(0);
        let err = with_retry(quick(4), "web", "delete user", &log, || {
            calls.set(calls.get() + 1);
            Err(ExecError::TimedOut {
                command: "userdel".to_string(),
                timeout: Duration::from_secs(60),
            })
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(err.is_timeout());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let log = CaptureLog::default();
        let err = with_retry(quick(0), "web", "delete user", &log, || {
            Err(failed("busy"))
        })
        .unwrap_err();
        assert!(matches!(err, HostError::RetriesExhausted { attempts: 1, .. }));
    }
}
