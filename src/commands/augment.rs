//! Command: print a unit merged with its directory's transform.
use std::io::Write as _;

use anyhow::{Context as _, Result};

use crate::cli::{AugmentOpts, GlobalOpts};
use crate::desired::{self, Transforms};
use crate::logging::Logger;

/// Merge `opts.file` with the transform named after its parent directory
/// and write the result to stdout.
///
/// # Errors
///
/// Returns an error if the transforms or the unit cannot be loaded, or if
/// no transform matches the unit's directory.
pub fn run(global: &GlobalOpts, opts: &AugmentOpts, log: &Logger) -> Result<()> {
    let dir = match &opts.transforms {
        Some(dir) => dir.clone(),
        None => super::load_config(global, log)?.transforms_dir,
    };
    log.debug(&format!("transforms: {}", dir.display()));

    let transforms = Transforms::load(&dir)?;
    let merged = desired::augment(&opts.file, &transforms)?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(merged.as_bytes())
        .and_then(|()| stdout.flush())
        .context("writing to stdout")?;
    Ok(())
}
