//! Host lifecycle manager: OS users, per-user systemd managers, and quadlet
//! files.
//!
//! Each deployment runs under its own unprivileged account. The account is
//! created with lingering enabled so its systemd instance outlives logins,
//! and the unit is handed to Podman's quadlet generator by writing it to
//! `~/.config/containers/systemd/<unit>.container`.
pub mod retry;
mod system;

use std::path::PathBuf;
use std::time::Duration;

pub use retry::RetryPolicy;
pub use system::SystemHost;

use crate::error::HostError;

/// Operations the reconciler needs from the host.
///
/// [`SystemHost`] is the production implementation; the reconciler is
/// exercised against fakes.
pub trait Host: std::fmt::Debug {
    /// Create `name` as a regular account in `group` and enable lingering.
    ///
    /// # Errors
    ///
    /// Any failure is returned; nothing is rolled back.
    fn create_user(&self, name: &str, group: &str) -> Result<(), HostError>;

    /// Start `user@<uid>.service` and wait for its bus socket.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ManagerNotReady`] if the socket never appears.
    fn ensure_user_manager_ready(&self, name: &str) -> Result<(), HostError>;

    /// Write `<unit>.container` into the user's quadlet directory.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the home lookup, write, or chown fails.
    fn write_quadlet(&self, name: &str, unit: &str, content: &str) -> Result<(), HostError>;

    /// Remove `<unit>.container`; an already absent file is success.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the home lookup or removal fails.
    fn remove_quadlet(&self, name: &str, unit: &str) -> Result<(), HostError>;

    /// `systemctl --user daemon-reload` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] on failure or timeout.
    fn reload(&self, name: &str) -> Result<(), HostError>;

    /// Restart `<unit>.service` under `name`'s manager.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] on failure or timeout.
    fn restart(&self, name: &str, unit: &str) -> Result<(), HostError>;

    /// Stop `<unit>.service` under `name`'s manager.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] on failure or timeout.
    fn stop(&self, name: &str, unit: &str) -> Result<(), HostError>;

    /// Tear down `name`'s sessions and manager, then delete the account and
    /// its home, retrying transient "busy" failures.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::RetriesExhausted`] when every attempt hit a
    /// transient failure, or the first non-transient failure.
    fn delete_user(&self, name: &str) -> Result<(), HostError>;

    /// Members of `group`; a missing or empty group yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the lookup fails for any other reason.
    fn list_managed_names(&self, group: &str) -> Result<Vec<String>, HostError>;
}

/// Tunables for [`SystemHost`].
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Parent of per-user runtime directories (`/run/user`).
    pub runtime_dir: PathBuf,
    /// How long to wait for a user manager's bus socket.
    pub ready_timeout: Duration,
    /// Interval between socket checks.
    pub ready_poll: Duration,
    /// Retry policy for `userdel`.
    pub retry: RetryPolicy,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from("/run/user"),
            ready_timeout: Duration::from_secs(10),
            ready_poll: Duration::from_millis(200),
            retry: RetryPolicy::default(),
        }
    }
}

/// Relative path of the quadlet directory under a user's home.
pub const QUADLET_DIR: &str = ".config/containers/systemd";
