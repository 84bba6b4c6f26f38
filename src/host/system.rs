use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use super::retry::with_retry;
use super::{Host, HostOptions, QUADLET_DIR};
use crate::desired::UNIT_EXTENSION;
use crate::error::HostError;
use crate::exec::{Executor, Timeout};
use crate::logging::Log;

/// [`Host`] that drives `useradd`, `loginctl`, `systemctl` and friends
/// through an [`Executor`].
#[derive(Debug)]
pub struct SystemHost {
    executor: Arc<dyn Executor>,
    options: HostOptions,
    log: Arc<dyn Log>,
}

impl SystemHost {
    /// Create a host manager issuing commands through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, options: HostOptions, log: Arc<dyn Log>) -> Self {
        Self {
            executor,
            options,
            log,
        }
    }

    fn run(
        &self,
        user: &str,
        operation: &'static str,
        timeout: Timeout,
        program: &str,
        args: &[&str],
    ) -> Result<String, HostError> {
        self.executor
            .run(timeout, program, args)
            .map(|r| r.stdout)
            .map_err(|e| HostError::from_exec(user, operation, e))
    }

    /// `systemctl --user -M <user>@ <args>` with inherited output.
    fn user_systemctl(
        &self,
        user: &str,
        operation: &'static str,
        args: &[&str],
    ) -> Result<(), HostError> {
        let machine = format!("{user}@");
        let mut full = vec!["--user", "-M", machine.as_str()];
        full.extend_from_slice(args);
        self.executor
            .run_inherited(Timeout::Service, "systemctl", &full)
            .map_err(|e| HostError::from_exec(user, operation, e))
    }

    fn uid(&self, user: &str) -> Result<u32, HostError> {
        let out = self.run(user, "look up uid", Timeout::Short, "id", &["-u", user])?;
        out.trim().parse().map_err(|_| HostError::Lookup {
            user: user.to_string(),
            operation: "look up uid",
            output: out.trim().to_string(),
        })
    }

    fn home(&self, user: &str) -> Result<PathBuf, HostError> {
        let out = self.run(
            user,
            "look up home",
            Timeout::Short,
            "getent",
            &["passwd", user],
        )?;
        parse_passwd_home(&out)
            .map(PathBuf::from)
            .ok_or_else(|| HostError::Lookup {
                user: user.to_string(),
                operation: "look up home",
                output: out.trim().to_string(),
            })
    }

    fn quadlet_path(&self, user: &str, unit: &str) -> Result<PathBuf, HostError> {
        Ok(self
            .home(user)?
            .join(QUADLET_DIR)
            .join(format!("{unit}.{UNIT_EXTENSION}")))
    }

    fn wait_for_socket(&self, socket: &Path) -> bool {
        let deadline = Instant::now() + self.options.ready_timeout;
        loop {
            if socket.exists() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.options.ready_poll);
        }
    }
}

impl Host for SystemHost {
    fn create_user(&self, name: &str, group: &str) -> Result<(), HostError> {
        // A regular account, so useradd allocates subordinate UID/GID ranges.
        self.run(
            name,
            "create user",
            Timeout::Default,
            "useradd",
            &["--create-home", "-s", "/sbin/nologin", "-G", group, name],
        )?;
        self.run(
            name,
            "enable linger",
            Timeout::Default,
            "loginctl",
            &["enable-linger", name],
        )?;
        self.log.debug(&format!("created user {name} in group {group}"));
        Ok(())
    }

    fn ensure_user_manager_ready(&self, name: &str) -> Result<(), HostError> {
        let uid = self.uid(name)?;
        let service = format!("user@{uid}.service");
        self.run(
            name,
            "start user manager",
            Timeout::Service,
            "systemctl",
            &["start", &service],
        )?;
        let socket = self.options.runtime_dir.join(uid.to_string()).join("bus");
        if self.wait_for_socket(&socket) {
            Ok(())
        } else {
            Err(HostError::ManagerNotReady {
                user: name.to_string(),
                socket,
            })
        }
    }

    fn write_quadlet(&self, name: &str, unit: &str, content: &str) -> Result<(), HostError> {
        let home = self.home(name)?;
        let dir = home.join(QUADLET_DIR);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| HostError::Io {
                user: name.to_string(),
                operation: "write quadlet",
                path,
                source,
            }
        };
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let path = dir.join(format!("{unit}.{UNIT_EXTENSION}"));
        fs::write(&path, content).map_err(io_err(&path))?;

        // Podman refuses to run if any directory above the unit is not owned
        // by the container user.
        let config = home.join(".config");
        let owner = format!("{name}:{name}");
        self.run(
            name,
            "chown config",
            Timeout::Default,
            "chown",
            &["-R", &owner, &config.to_string_lossy()],
        )?;
        self.log.debug(&format!("wrote {}", path.display()));
        Ok(())
    }

    fn remove_quadlet(&self, name: &str, unit: &str) -> Result<(), HostError> {
        let path = self.quadlet_path(name, unit)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HostError::Io {
                user: name.to_string(),
                operation: "remove quadlet",
                path,
                source,
            }),
        }
    }

    fn reload(&self, name: &str) -> Result<(), HostError> {
        self.user_systemctl(name, "daemon-reload", &["daemon-reload"])
    }

    fn restart(&self, name: &str, unit: &str) -> Result<(), HostError> {
        let service = format!("{unit}.service");
        self.user_systemctl(name, "restart unit", &["restart", &service])
    }

    fn stop(&self, name: &str, unit: &str) -> Result<(), HostError> {
        let service = format!("{unit}.service");
        self.user_systemctl(name, "stop unit", &["stop", &service])
    }

    fn delete_user(&self, name: &str) -> Result<(), HostError> {
        if let Err(e) = self.run(
            name,
            "disable linger",
            Timeout::Default,
            "loginctl",
            &["disable-linger", name],
        ) {
            self.log.warn(&e.to_string());
        }

        // Stopping the slice terminates sessions and the manager synchronously.
        match self.uid(name) {
            Ok(uid) => {
                let slice = format!("user-{uid}.slice");
                if let Err(e) = self.run(
                    name,
                    "stop user slice",
                    Timeout::Service,
                    "systemctl",
                    &["stop", &slice],
                ) {
                    self.log.warn(&e.to_string());
                }
            }
            Err(e) => self.log.warn(&e.to_string()),
        }

        with_retry(
            self.options.retry,
            name,
            "delete user",
            self.log.as_ref(),
            || {
                self.executor
                    .run(Timeout::Default, "userdel", &["-r", name])
                    .map(|_| ())
            },
        )?;
        self.log.debug(&format!("deleted user {name}"));
        Ok(())
    }

    fn list_managed_names(&self, group: &str) -> Result<Vec<String>, HostError> {
        match self
            .executor
            .run(Timeout::Short, "getent", &["group", group])
        {
            Ok(result) => Ok(parse_group_members(&result.stdout)),
            // getent exits 2 when the key is not found.
            Err(e) if e.code() == Some(2) => Ok(Vec::new()),
            Err(e) => Err(HostError::from_exec(group, "list group members", e)),
        }
    }
}

/// Home directory (sixth field) of a `getent passwd` line.
fn parse_passwd_home(line: &str) -> Option<&str> {
    line.trim()
        .split(':')
        .nth(5)
        .filter(|home| !home.is_empty())
}

/// Member list (fourth field) of a `getent group` line.
fn parse_group_members(line: &str) -> Vec<String> {
    line.trim()
        .split(':')
        .nth(3)
        .map(|members| {
            members
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
