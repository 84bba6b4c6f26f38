//! Command: validate a unit tree offline.
use anyhow::{Result, bail};

use crate::cli::CheckOpts;
use crate::logging::Logger;
use crate::validate;

/// Validate every unit under `opts.dir` and report all problems.
///
/// # Errors
///
/// Returns an error if the tree cannot be read or any issue was found.
pub fn run(opts: &CheckOpts, log: &Logger) -> Result<()> {
    log.stage(&format!("Checking {}", opts.dir.display()));
    let issues = validate::check(&opts.dir)?;
    if issues.is_empty() {
        log.info("no issues found");
        return Ok(());
    }
    for issue in &issues {
        log.error(&issue.to_string());
    }
    bail!("{} issue(s) found", issues.len());
}
