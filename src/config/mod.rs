//! Runtime configuration from an environment file and the process
//! environment.
mod env_file;

pub use env_file::parse_env_file;

use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default location of the environment file.
pub const DEFAULT_ENV_FILE: &str = "/etc/quadsync/quadsync.env";

/// Variables read from the environment file and the process environment.
pub const KEYS: &[&str] = &[
    "QUADSYNC_REPO_URL",
    "QUADSYNC_REPO_BRANCH",
    "QUADSYNC_REPO_DIR",
    "QUADSYNC_TRANSFORMS_DIR",
    "QUADSYNC_STATE_DIR",
    "QUADSYNC_GROUP",
];

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Git remote; required for `sync`.
    pub repo_url: Option<String>,
    /// Branch to track.
    pub repo_branch: String,
    /// Local working copy.
    pub repo_dir: PathBuf,
    /// Directory of transform files.
    pub transforms_dir: PathBuf,
    /// Directory holding `state.json`.
    pub state_dir: PathBuf,
    /// Group that marks managed accounts.
    pub group: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_map(&BTreeMap::new())
    }
}

impl Config {
    /// Build a configuration from resolved variables, applying defaults.
    ///
    /// Empty values count as unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use quadsync::config::Config;
    ///
    /// let config = Config::from_map(&BTreeMap::new());
    /// assert_eq!(config.repo_branch, "main");
    /// assert_eq!(config.group, "quadsync");
    /// assert!(config.repo_url.is_none());
    /// ```
    #[must_use]
    pub fn from_map(vars: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        let path = |key: &str, default: &str| {
            PathBuf::from(get(key).unwrap_or_else(|| default.to_string()))
        };
        Self {
            repo_url: get("QUADSYNC_REPO_URL"),
            repo_branch: get("QUADSYNC_REPO_BRANCH").unwrap_or_else(|| "main".to_string()),
            repo_dir: path("QUADSYNC_REPO_DIR", "/var/lib/quadsync/repo"),
            transforms_dir: path("QUADSYNC_TRANSFORMS_DIR", "/etc/quadsync/transforms"),
            state_dir: path("QUADSYNC_STATE_DIR", "/var/lib/quadsync/state"),
            group: get("QUADSYNC_GROUP").unwrap_or_else(|| "quadsync".to_string()),
        }
    }

    /// Load `env_file` (a missing file is fine), then let process
    /// environment variables of the same names override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(env_file: &Path) -> Result<Self> {
        let mut vars = if env_file.exists() {
            let text = std::fs::read_to_string(env_file)
                .with_context(|| format!("reading {}", env_file.display()))?;
            parse_env_file(&text)
        } else {
            BTreeMap::new()
        };
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                vars.insert((*key).to_string(), value);
            }
        }
        Ok(Self::from_map(&vars))
    }

    /// The repository URL, or an error naming the variable to set.
    ///
    /// # Errors
    ///
    /// Returns an error if `QUADSYNC_REPO_URL` is unset or empty.
    pub fn require_repo_url(&self) -> Result<&str> {
        self.repo_url
            .as_deref()
            .context("QUADSYNC_REPO_URL is not set")
    }
}
