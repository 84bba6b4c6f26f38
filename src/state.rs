//! Persisted per-name content hashes and redeploy markers.
//!
//! Stored as `<state_dir>/state.json`:
//!
//! ```json
//! { "hashes": { "web": "9f86d0…" }, "pending": ["db"], "in_progress": false }
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Name of the record file inside the state directory.
pub const STATE_FILE: &str = "state.json";

/// Last-applied content hash per deployment name, plus pending redeploys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    #[serde(default)]
    pending: BTreeSet<String>,
    #[serde(default)]
    in_progress: bool,
}

impl PersistedRecord {
    /// Last-applied hash for `name`.
    #[must_use]
    pub fn hash(&self, name: &str) -> Option<&str> {
        self.hashes.get(name).map(String::as_str)
    }

    /// Record a successful apply; clears any pending marker for `name`.
    pub fn set_hash(&mut self, name: &str, hash: &str) {
        self.hashes.insert(name.to_string(), hash.to_string());
        self.pending.remove(name);
    }

    /// Forget `name` entirely.
    pub fn remove(&mut self, name: &str) {
        self.hashes.remove(name);
        self.pending.remove(name);
    }

    /// Drop the hash for `name` and mark it for redeploy on the next cycle.
    pub fn mark_redeploy(&mut self, name: &str) {
        self.hashes.remove(name);
        self.pending.insert(name.to_string());
    }

    /// Mark `name` for another attempt on the next cycle, keeping its hash.
    pub fn mark_pending(&mut self, name: &str) {
        self.pending.insert(name.to_string());
    }

    /// Whether `name` carries a redeploy marker.
    #[must_use]
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// Whether any redeploy marker is set.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Names with a redeploy marker, sorted.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// Clear the redeploy marker for `name`, keeping its hash.
    pub fn clear_pending(&mut self, name: &str) {
        self.pending.remove(name);
    }

    /// Names with a recorded hash, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(String::as_str)
    }

    /// Flag a cycle as started; stays set until [`Self::finish_cycle`].
    pub const fn begin_cycle(&mut self) {
        self.in_progress = true;
    }

    /// Flag the running cycle as complete.
    pub const fn finish_cycle(&mut self) {
        self.in_progress = false;
    }

    /// Whether a previous cycle started but never finished.
    #[must_use]
    pub const fn cycle_interrupted(&self) -> bool {
        self.in_progress
    }
}

/// File-backed store for the [`PersistedRecord`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store whose record lives at `<dir>/state.json`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STATE_FILE),
        }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; a missing file is an empty record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Read`] or [`StateError::Decode`] when the file
    /// exists but cannot be read or parsed.
    pub fn load(&self) -> Result<PersistedRecord, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(PersistedRecord::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| StateError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the record atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Encode`] or [`StateError::Write`].
    pub fn save(&self, record: &PersistedRecord) -> Result<(), StateError> {
        let mut json =
            serde_json::to_string_pretty(record).map_err(|source| StateError::Encode { source })?;
        json.push('\n');

        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}
