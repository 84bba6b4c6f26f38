//! Offline validation of an input tree (`quadsync check`).
//!
//! Runs the same discovery as the desired-state builder but reports every
//! problem it finds instead of stopping at the first.
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::desired::{subdirectories, unit_files};
use crate::error::BuildError;
use crate::ini::Document;

/// Longest accepted deployment name; names double as Linux user names.
pub const MAX_NAME_LEN: usize = 32;

/// A problem found in one unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// File the issue was found in.
    pub path: PathBuf,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Whether `name` is usable as a deployment (and user) name:
/// `^[a-z][a-z0-9-]*$`, at most [`MAX_NAME_LEN`] characters.
///
/// # Examples
///
/// ```
/// use quadsync::validate::is_valid_name;
///
/// assert!(is_valid_name("web-01"));
/// assert!(!is_valid_name("Web"));
/// assert!(!is_valid_name("1web"));
/// ```
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_NAME_LEN
        && first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate every unit file under `dir` (root level and one level of
/// non-hidden subdirectories).
///
/// # Errors
///
/// Returns [`BuildError::Io`] if the tree itself cannot be listed.
pub fn check(dir: &Path) -> Result<Vec<ValidationIssue>, BuildError> {
    let mut files = unit_files(dir)?;
    for sub in subdirectories(dir)? {
        files.extend(unit_files(&sub)?);
    }

    let mut issues = Vec::new();
    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in files {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !is_valid_name(&name) {
            issues.push(ValidationIssue::new(
                &path,
                format!(
                    "invalid name '{name}': must match ^[a-z][a-z0-9-]*$ and be at most {MAX_NAME_LEN} characters"
                ),
            ));
        }
        if let Some(first) = seen.get(&name) {
            issues.push(ValidationIssue::new(
                &path,
                format!(
                    "duplicate container name '{name}' (first defined in {})",
                    first.display()
                ),
            ));
        } else {
            seen.insert(name, path.clone());
        }

        issues.extend(check_file(&path));
    }
    Ok(issues)
}

fn check_file(path: &Path) -> Vec<ValidationIssue> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return vec![ValidationIssue::new(path, format!("unreadable: {e}"))],
    };
    let doc = match Document::parse(&text) {
        Ok(doc) => doc,
        Err(e) => return vec![ValidationIssue::new(path, e.to_string())],
    };
    if !doc.has_section("Container") {
        return vec![ValidationIssue::new(path, "missing [Container] section")];
    }
    match doc.get("Container", "Image") {
        Some(image) if !image.is_empty() => Vec::new(),
        _ => vec![ValidationIssue::new(path, "[Container] has no Image=")],
    }
}
