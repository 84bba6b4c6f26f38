// Shared helpers for integration tests.
//
// Provides in-memory stand-ins for the host and the repository synchronizer,
// plus a harness that owns a unit tree, a transform directory and a state
// directory, so each test can drive whole reconcile cycles without touching
// real users or systemd.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quadsync::error::{ExecError, HostError, SyncError};
use quadsync::host::Host;
use quadsync::logging::{DeploymentEntry, Log, Status};
use quadsync::reconcile::{CycleReport, ReconcileOptions, Reconciler};
use quadsync::repo::{SyncOutcome, Synchronizer};
use quadsync::state::{PersistedRecord, StateStore};

/// Group used by the harness.
pub const GROUP: &str = "quadsync";

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent dir");
    std::fs::write(path, content).expect("write file");
}

fn command_failure(user: &str, operation: &'static str) -> HostError {
    HostError::Command {
        user: user.to_string(),
        operation,
        source: ExecError::Failed {
            command: format!("fake {operation}"),
            code: Some(1),
            output: "simulated failure".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// In-memory [`Host`] that records every call as `"<op> <args>"`.
#[derive(Debug, Default)]
pub struct FakeHost {
    calls: Mutex<Vec<String>>,
    managed: Mutex<BTreeSet<String>>,
    quadlets: Mutex<BTreeMap<String, String>>,
    failing: Mutex<BTreeSet<String>>,
    failing_stop: Mutex<BTreeSet<String>>,
}

impl FakeHost {
    /// Pretend `name` already exists as a managed user.
    pub fn add_managed(&self, name: &str) {
        self.managed.lock().expect("lock").insert(name.to_string());
    }

    /// Make every mutating operation for `name` fail.
    pub fn fail(&self, name: &str) {
        self.failing.lock().expect("lock").insert(name.to_string());
    }

    /// Let operations for `name` succeed again.
    pub fn heal(&self, name: &str) {
        self.failing.lock().expect("lock").remove(name);
    }

    /// Make only `stop` fail for `name`.
    pub fn fail_stop(&self, name: &str) {
        self.failing_stop.lock().expect("lock").insert(name.to_string());
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    /// Calls whose operation is `op`.
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().expect("lock").clear();
    }

    /// Current managed user set.
    pub fn managed(&self) -> BTreeSet<String> {
        self.managed.lock().expect("lock").clone()
    }

    /// Last quadlet content written for `name`.
    pub fn quadlet(&self, name: &str) -> Option<String> {
        self.quadlets.lock().expect("lock").get(name).cloned()
    }

    fn note(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }

    fn check(&self, name: &str, operation: &'static str) -> Result<(), HostError> {
        if self.failing.lock().expect("lock").contains(name) {
            Err(command_failure(name, operation))
        } else {
            Ok(())
        }
    }
}

impl Host for FakeHost {
    fn create_user(&self, name: &str, group: &str) -> Result<(), HostError> {
        self.note(format!("create_user {name} {group}"));
        self.check(name, "create user")?;
        self.add_managed(name);
        Ok(())
    }

    fn ensure_user_manager_ready(&self, name: &str) -> Result<(), HostError> {
        self.note(format!("ready {name}"));
        self.check(name, "start user manager")
    }

    fn write_quadlet(&self, name: &str, unit: &str, content: &str) -> Result<(), HostError> {
        self.note(format!("write {name} {unit}"));
        self.check(name, "write quadlet")?;
        self.quadlets
            .lock()
            .expect("lock")
            .insert(unit.to_string(), content.to_string());
        Ok(())
    }

    fn remove_quadlet(&self, name: &str, unit: &str) -> Result<(), HostError> {
        self.note(format!("remove_quadlet {name} {unit}"));
        self.check(name, "remove quadlet")?;
        self.quadlets.lock().expect("lock").remove(unit);
        Ok(())
    }

    fn reload(&self, name: &str) -> Result<(), HostError> {
        self.note(format!("reload {name}"));
        self.check(name, "daemon-reload")
    }

    fn restart(&self, name: &str, unit: &str) -> Result<(), HostError> {
        self.note(format!("restart {name} {unit}"));
        self.check(name, "restart")
    }

    fn stop(&self, name: &str, unit: &str) -> Result<(), HostError> {
        self.note(format!("stop {name} {unit}"));
        if self.failing_stop.lock().expect("lock").contains(name) {
            return Err(command_failure(name, "stop"));
        }
        self.check(name, "stop")
    }

    fn delete_user(&self, name: &str) -> Result<(), HostError> {
        self.note(format!("delete_user {name}"));
        self.check(name, "delete user")?;
        self.managed.lock().expect("lock").remove(name);
        Ok(())
    }

    fn list_managed_names(&self, group: &str) -> Result<Vec<String>, HostError> {
        self.note(format!("list {group}"));
        Ok(self.managed().into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// FakeSynchronizer
// ---------------------------------------------------------------------------

/// [`Synchronizer`] over a local directory that reports a scripted outcome.
#[derive(Debug)]
pub struct FakeSynchronizer {
    dir: PathBuf,
    outcome: Mutex<SyncOutcome>,
    broken: Mutex<bool>,
}

impl FakeSynchronizer {
    /// Synchronizer over `dir` that reports [`SyncOutcome::Cloned`].
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            outcome: Mutex::new(SyncOutcome::Cloned),
            broken: Mutex::new(false),
        }
    }

    /// Outcome reported by every following sync.
    pub fn set_outcome(&self, outcome: SyncOutcome) {
        *self.outcome.lock().expect("lock") = outcome;
    }

    /// Make every following sync fail.
    pub fn break_sync(&self) {
        *self.broken.lock().expect("lock") = true;
    }
}

impl Synchronizer for FakeSynchronizer {
    fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if *self.broken.lock().expect("lock") {
            return Err(SyncError::Git {
                step: "fetch",
                source: ExecError::Failed {
                    command: "git fetch".to_string(),
                    code: Some(128),
                    output: "could not resolve host".to_string(),
                },
            });
        }
        Ok(self.outcome.lock().expect("lock").clone())
    }

    fn workdir(&self) -> &Path {
        &self.dir
    }
}

// ---------------------------------------------------------------------------
// MemoryLog
// ---------------------------------------------------------------------------

/// [`Log`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
    entries: Mutex<Vec<DeploymentEntry>>,
}

impl MemoryLog {
    /// Log lines as `"[<level>] <message>"`.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock").clone()
    }

    /// Recorded deployment entries.
    pub fn entries(&self) -> Vec<DeploymentEntry> {
        self.entries.lock().expect("lock").clone()
    }

    fn push(&self, level: &str, msg: &str) {
        self.lines.lock().expect("lock").push(format!("[{level}] {msg}"));
    }
}

impl Log for MemoryLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
    fn record(&self, name: &str, status: Status, message: Option<&str>) {
        self.entries.lock().expect("lock").push(DeploymentEntry {
            name: name.to_string(),
            status,
            message: message.map(String::from),
        });
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A unit tree, transform directory and state directory wired to fakes.
#[derive(Debug)]
pub struct Harness {
    /// Unit tree served by the synchronizer.
    pub tree: tempfile::TempDir,
    /// Transform directory.
    pub transforms: tempfile::TempDir,
    /// State directory backing `store`.
    pub state: tempfile::TempDir,
    /// Scripted synchronizer.
    pub sync: FakeSynchronizer,
    /// In-memory host.
    pub host: FakeHost,
    /// Persisted record store.
    pub store: StateStore,
    /// Captured log output.
    pub log: MemoryLog,
}

impl Harness {
    /// Fresh harness with empty directories.
    pub fn new() -> Self {
        let tree = tempfile::tempdir().expect("tree tempdir");
        let transforms = tempfile::tempdir().expect("transforms tempdir");
        let state = tempfile::tempdir().expect("state tempdir");
        let sync = FakeSynchronizer::new(tree.path());
        let store = StateStore::new(state.path());
        Self {
            tree,
            transforms,
            state,
            sync,
            host: FakeHost::default(),
            store,
            log: MemoryLog::default(),
        }
    }

    /// Write a file into the unit tree.
    pub fn unit(&self, rel: &str, content: &str) -> &Self {
        write_file(self.tree.path(), rel, content);
        self
    }

    /// Delete a file from the unit tree.
    pub fn drop_unit(&self, rel: &str) -> &Self {
        std::fs::remove_file(self.tree.path().join(rel)).expect("remove unit");
        self
    }

    /// Write a transform file.
    pub fn transform(&self, rel: &str, content: &str) -> &Self {
        write_file(self.transforms.path(), rel, content);
        self
    }

    /// Run one cycle.
    pub fn cycle(&self, force: bool) -> CycleReport {
        self.try_cycle(force).expect("cycle should run")
    }

    /// Run one cycle, returning the cycle-level error if any.
    pub fn try_cycle(&self, force: bool) -> Result<CycleReport, quadsync::error::ReconcileError> {
        let reconciler = Reconciler::new(
            &self.sync,
            &self.host,
            &self.store,
            &self.log,
            ReconcileOptions {
                transforms_dir: self.transforms.path().to_path_buf(),
                group: GROUP.to_string(),
                force,
            },
        );
        reconciler.run_cycle()
    }

    /// Persisted record as currently on disk.
    pub fn record(&self) -> PersistedRecord {
        self.store.load().expect("load record")
    }
}

/// Shorthand for a status lookup that must exist.
pub fn status_of(report: &CycleReport, name: &str) -> Status {
    report
        .status(name)
        .unwrap_or_else(|| panic!("{name} missing from report: {report:?}"))
}
