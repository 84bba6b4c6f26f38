//! Top-level subcommand orchestration.
pub mod augment;
pub mod check;
pub mod redeploy;
pub mod sync;
pub mod version;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::logging::Logger;

/// Load configuration from the environment file named on the command line
/// and log what was resolved.
///
/// # Errors
///
/// Returns an error if the environment file exists but cannot be read.
pub fn load_config(global: &GlobalOpts, log: &Logger) -> Result<Config> {
    log.stage("Loading configuration");
    let config = Config::load(&global.env_file)?;

    log.debug(&format!("env file: {}", global.env_file.display()));
    log.debug(&format!(
        "repo: {} ({})",
        config.repo_url.as_deref().unwrap_or("<unset>"),
        config.repo_branch
    ));
    log.debug(&format!("repo dir: {}", config.repo_dir.display()));
    log.debug(&format!("transforms: {}", config.transforms_dir.display()));
    log.debug(&format!("state dir: {}", config.state_dir.display()));
    log.debug(&format!("group: {}", config.group));
    Ok(config)
}
