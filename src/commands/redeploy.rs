//! Command: mark a deployment for redeploy.
use anyhow::{Result, bail};

use crate::cli::{GlobalOpts, RedeployOpts};
use crate::logging::Logger;
use crate::reconcile;
use crate::state::StateStore;
use crate::validate::is_valid_name;

/// Record a redeploy marker for `opts.name` in the state file.
///
/// # Errors
///
/// Returns an error if the name is invalid or the state file cannot be
/// updated.
pub fn run(global: &GlobalOpts, opts: &RedeployOpts, log: &Logger) -> Result<()> {
    if !is_valid_name(&opts.name) {
        bail!("invalid deployment name '{}'", opts.name);
    }
    let config = super::load_config(global, log)?;
    let store = StateStore::new(&config.state_dir);
    reconcile::redeploy(&store, &opts.name)?;
    log.info(&format!(
        "{} will be re-applied on the next sync ({})",
        opts.name,
        store.path().display()
    ));
    Ok(())
}
