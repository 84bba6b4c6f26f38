//! Git repository synchronizer.
//!
//! Keeps a shallow, single-branch working copy of the remote in a local
//! directory. Local modifications are discarded: the remote is the single
//! source of truth.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ExecError, SyncError};
use crate::exec::{Executor, Timeout};

/// What a sync did to the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The working copy did not exist and was cloned.
    Cloned,
    /// New commits were fetched and checked out.
    Updated {
        /// Commit before the sync.
        from: String,
        /// Commit after the sync.
        to: String,
    },
    /// The remote head matched the local head.
    Unchanged,
}

impl SyncOutcome {
    /// Whether the working copy content may have changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Source of the input tree for a reconcile cycle.
pub trait Synchronizer: std::fmt::Debug {
    /// Bring the working copy up to date with the remote.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when a git step fails or times out.
    fn sync(&self) -> Result<SyncOutcome, SyncError>;

    /// Directory holding the working copy.
    fn workdir(&self) -> &Path;
}

/// [`Synchronizer`] backed by the `git` command line.
#[derive(Debug)]
pub struct GitSynchronizer {
    url: String,
    branch: String,
    dir: PathBuf,
    executor: Arc<dyn Executor>,
}

impl GitSynchronizer {
    /// Track `branch` of `url` in `dir`.
    #[must_use]
    pub fn new(url: &str, branch: &str, dir: &Path, executor: Arc<dyn Executor>) -> Self {
        Self {
            url: url.to_string(),
            branch: branch.to_string(),
            dir: dir.to_path_buf(),
            executor,
        }
    }

    fn clone_fresh(&self) -> Result<SyncOutcome, SyncError> {
        if let Some(parent) = self.dir.parent() {
            fs::create_dir_all(parent).map_err(|source| SyncError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let dir = self.dir.to_string_lossy();
        self.executor
            .run(
                Timeout::Network,
                "git",
                &[
                    "clone",
                    "--branch",
                    &self.branch,
                    "--single-branch",
                    "--depth=1",
                    &self.url,
                    &dir,
                ],
            )
            .map_err(git("clone"))?;
        Ok(SyncOutcome::Cloned)
    }

    fn rev_parse(&self, rev: &str) -> Result<String, SyncError> {
        let result = self
            .executor
            .run_in(&self.dir, Timeout::Short, "git", &["rev-parse", rev])
            .map_err(git("rev-parse"))?;
        Ok(result.stdout.trim().to_string())
    }

    fn update(&self) -> Result<SyncOutcome, SyncError> {
        self.executor
            .run_in(
                &self.dir,
                Timeout::Network,
                "git",
                &["fetch", "--depth=1", "origin", &self.branch],
            )
            .map_err(git("fetch"))?;

        let local = self.rev_parse("HEAD")?;
        let remote = self.rev_parse("FETCH_HEAD")?;
        if local == remote {
            return Ok(SyncOutcome::Unchanged);
        }

        self.executor
            .run_in(
                &self.dir,
                Timeout::Default,
                "git",
                &["reset", "--hard", &remote],
            )
            .map_err(git("reset"))?;
        Ok(SyncOutcome::Updated {
            from: local,
            to: remote,
        })
    }
}

impl Synchronizer for GitSynchronizer {
    fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if self.dir.join(".git").exists() {
            self.update()
        } else {
            self.clone_fresh()
        }
    }

    fn workdir(&self) -> &Path {
        &self.dir
    }
}

fn git(step: &'static str) -> impl Fn(ExecError) -> SyncError {
    move |source| SyncError::Git { step, source }
}
