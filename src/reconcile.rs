//! Reconcile cycle: sync, plan, diff against the persisted record, apply.
//!
//! Per deployment name:
//!
//! ```text
//! Absent ──create_user──▶ Provisioned ──write/reload/restart──▶ Deployed(h)
//!                                                                   │
//!                       Deployed(h') ◀──content changed / redeploy──┘
//!                            │
//!                            └──name gone──▶ Removing ──▶ Absent
//! ```
//!
//! A failing name never stops the cycle; it is reported and marked for
//! redeploy so the next cycle retries it even if the repository is quiet.
//! The record is flagged while a cycle runs; a cycle that aborts leaves the
//! flag set and the next tick runs in full.
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::desired::{self, DesiredUnit, Transforms};
use crate::error::{BuildError, HostError, ReconcileError, StateError};
use crate::host::Host;
use crate::logging::{DeploymentEntry, Log, Status};
use crate::repo::{SyncOutcome, Synchronizer};
use crate::state::{PersistedRecord, StateStore};

/// Settings for one reconcile cycle.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Directory holding transform files.
    pub transforms_dir: PathBuf,
    /// Group that marks accounts as managed.
    pub group: String,
    /// Run the full cycle even when nothing changed.
    pub force: bool,
}

/// Outcome of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The cycle stopped after sync because nothing changed.
    pub skipped: bool,
    /// Per-name results in processing order.
    pub entries: Vec<DeploymentEntry>,
}

impl CycleReport {
    /// Names whose status is [`Status::Failed`].
    #[must_use]
    pub fn failed_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == Status::Failed)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Status recorded for `name`, if it was processed.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<Status> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.status)
    }

    /// Convert into an error when any name failed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Failed`] listing the failed names.
    pub fn into_result(self) -> Result<Self, ReconcileError> {
        let names = self.failed_names();
        if names.is_empty() {
            Ok(self)
        } else {
            Err(ReconcileError::Failed { names })
        }
    }
}

/// Drives one reconcile cycle against its collaborators.
#[derive(Debug)]
pub struct Reconciler<'a> {
    sync: &'a dyn Synchronizer,
    host: &'a dyn Host,
    store: &'a StateStore,
    log: &'a dyn Log,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    /// Wire a reconciler.
    #[must_use]
    pub const fn new(
        sync: &'a dyn Synchronizer,
        host: &'a dyn Host,
        store: &'a StateStore,
        log: &'a dyn Log,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            sync,
            host,
            store,
            log,
            options,
        }
    }

    /// Run one cycle.
    ///
    /// Per-name failures are reported in the returned [`CycleReport`];
    /// use [`CycleReport::into_result`] to turn them into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when the cycle cannot proceed at all: sync
    /// failure, unreadable or unwritable state, an unbuildable desired state,
    /// or managed users that cannot be listed.
    pub fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        self.log.stage("Syncing repository");
        let outcome = self.sync.sync()?;
        match &outcome {
            SyncOutcome::Cloned => self.log.info("cloned repository"),
            SyncOutcome::Updated { from, to } => {
                self.log.info(&format!("updated {} -> {}", short(from), short(to)));
            }
            SyncOutcome::Unchanged => self.log.debug("repository unchanged"),
        }

        let mut record = self.store.load()?;
        let interrupted = record.cycle_interrupted();
        if interrupted {
            self.log.warn("previous cycle did not finish, running again");
        }
        if !outcome.changed() && !record.has_pending() && !interrupted && !self.options.force {
            self.log.info("nothing to do");
            return Ok(CycleReport {
                skipped: true,
                entries: Vec::new(),
            });
        }
        record.begin_cycle();
        self.store.save(&record)?;

        self.log.stage("Building desired state");
        let transforms = Transforms::load(&self.options.transforms_dir)?;
        let desired = desired::build(self.sync.workdir(), &transforms)?;
        for dir in &desired.skipped_dirs {
            self.log
                .debug(&format!("skipping {}: no matching transform", dir.display()));
        }
        let managed: BTreeSet<String> = self
            .host
            .list_managed_names(&self.options.group)?
            .into_iter()
            .collect();
        self.log.debug(&format!(
            "{} transforms, {} desired, {} held, {} managed",
            transforms.len(),
            desired.units.len(),
            desired.held.len(),
            managed.len()
        ));

        let mut report = CycleReport::default();

        self.log.stage("Applying deployments");
        for unit in desired.units.values() {
            let result = self.deploy(unit, managed.contains(&unit.name), &record);
            match result {
                Ok(Status::Unchanged) => {
                    if record.is_pending(&unit.name) {
                        record.clear_pending(&unit.name);
                        self.store.save(&record)?;
                    }
                    self.log.debug(&format!("{}: unchanged", unit.name));
                    self.push(&mut report, &unit.name, Status::Unchanged, None);
                }
                Ok(status) => {
                    record.set_hash(&unit.name, &unit.hash);
                    self.store.save(&record)?;
                    self.log.info(&format!("{}: {}", unit.name, status.label()));
                    self.push(&mut report, &unit.name, status, None);
                }
                Err(e) => self.fail(&mut report, &mut record, &unit.name, &e.to_string())?,
            }
        }

        for held in desired.held.values() {
            let message = held.reason.to_string();
            self.log.error(&format!("{}: held: {message}", held.name));
            // Retried every cycle until the transform parses again.
            if matches!(held.reason, BuildError::BrokenTransform { .. }) {
                record.mark_pending(&held.name);
                self.store.save(&record)?;
            }
            self.push(&mut report, &held.name, Status::Failed, Some(&message));
        }

        let orphans: Vec<&String> = managed.iter().filter(|n| !desired.claims(n)).collect();
        if !orphans.is_empty() {
            self.log.stage("Removing deployments");
        }
        for name in orphans {
            match self.remove(name) {
                Ok(()) => {
                    record.remove(name);
                    self.store.save(&record)?;
                    self.log.info(&format!("{name}: removed"));
                    self.push(&mut report, name, Status::Removed, None);
                }
                Err(e) => self.fail(&mut report, &mut record, name, &e.to_string())?,
            }
        }

        // Records for names that are neither in the tree nor on the host.
        let stale: Vec<String> = record
            .names()
            .chain(record.pending())
            .filter(|n| !desired.claims(n) && !managed.contains(*n))
            .map(String::from)
            .collect();
        for name in &stale {
            self.log.debug(&format!("{name}: dropping stale record"));
            record.remove(name);
        }
        record.finish_cycle();
        self.store.save(&record)?;

        Ok(report)
    }

    /// Bring one desired unit to its target state.
    fn deploy(
        &self,
        unit: &DesiredUnit,
        managed: bool,
        record: &PersistedRecord,
    ) -> Result<Status, HostError> {
        let name = unit.name.as_str();
        if managed {
            if record.hash(name) == Some(unit.hash.as_str()) {
                return Ok(Status::Unchanged);
            }
        } else {
            self.log.debug(&format!("{name}: provisioning user"));
            self.host.create_user(name, &self.options.group)?;
        }
        self.host.ensure_user_manager_ready(name)?;
        self.host.write_quadlet(name, name, &unit.content)?;
        self.host.reload(name)?;
        self.host.restart(name, name)?;
        Ok(if managed {
            Status::Updated
        } else {
            Status::Created
        })
    }

    /// Tear down a name that left the tree.
    fn remove(&self, name: &str) -> Result<(), HostError> {
        if let Err(e) = self.host.stop(name, name) {
            self.log.warn(&format!("{name}: stop failed, continuing: {e}"));
        }
        self.host.remove_quadlet(name, name)?;
        self.host.delete_user(name)
    }

    fn fail(
        &self,
        report: &mut CycleReport,
        record: &mut PersistedRecord,
        name: &str,
        message: &str,
    ) -> Result<(), StateError> {
        self.log.error(&format!("{name}: {message}"));
        record.mark_redeploy(name);
        self.store.save(record)?;
        self.push(report, name, Status::Failed, Some(message));
        Ok(())
    }

    fn push(&self, report: &mut CycleReport, name: &str, status: Status, message: Option<&str>) {
        self.log.record(name, status, message);
        report.entries.push(DeploymentEntry {
            name: name.to_string(),
            status,
            message: message.map(String::from),
        });
    }
}

/// Clear the persisted hash for `name` and mark it for redeploy.
///
/// The host is not touched; the next cycle re-applies the unit even if the
/// repository did not change.
///
/// # Errors
///
/// Returns [`StateError`] if the record cannot be loaded or saved.
pub fn redeploy(store: &StateStore, name: &str) -> Result<(), StateError> {
    let mut record = store.load()?;
    record.mark_redeploy(name);
    store.save(&record)
}

fn short(rev: &str) -> &str {
    rev.get(..12).unwrap_or(rev)
}
