//! Command: sync the repository and reconcile every deployment.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, SyncOpts};
use crate::exec::{Executor, SystemExecutor};
use crate::host::{HostOptions, SystemHost};
use crate::logging::{Log, Logger};
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::repo::GitSynchronizer;
use crate::state::StateStore;

/// Programs a reconcile cycle shells out to.
const REQUIRED_TOOLS: &[&str] = &[
    "git",
    "systemctl",
    "loginctl",
    "useradd",
    "userdel",
    "getent",
    "chown",
];

/// Run one reconcile cycle.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the cycle cannot run,
/// or any deployment failed.
pub fn run(global: &GlobalOpts, opts: &SyncOpts, log: &Arc<Logger>) -> Result<()> {
    let config = super::load_config(global, log)?;
    let url = config.require_repo_url()?;

    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| !executor.which(tool))
        .collect();
    if !missing.is_empty() {
        log.warn(&format!("not found on PATH: {}", missing.join(", ")));
    }

    let sync = GitSynchronizer::new(
        url,
        &config.repo_branch,
        &config.repo_dir,
        Arc::clone(&executor),
    );
    let host_log: Arc<dyn Log> = Arc::<Logger>::clone(log);
    let host = SystemHost::new(executor, HostOptions::default(), host_log);
    let store = StateStore::new(&config.state_dir);

    let reconciler = Reconciler::new(
        &sync,
        &host,
        &store,
        log.as_ref(),
        ReconcileOptions {
            transforms_dir: config.transforms_dir.clone(),
            group: config.group.clone(),
            force: opts.force,
        },
    );

    let report = reconciler.run_cycle()?;
    if report.skipped {
        return Ok(());
    }
    log.print_summary();
    report.into_result()?;
    Ok(())
}
