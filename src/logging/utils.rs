//! Utility functions for path resolution, ANSI stripping, and time formatting.
use std::fs;
use std::path::PathBuf;

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range), so cursor movement, erase, etc.
/// are also stripped without consuming unrelated text.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Environment variable that overrides the log directory.
pub(super) const LOG_DIR_ENV: &str = "QUADSYNC_LOG_DIR";

/// Resolve the log directory, creating it if needed.
///
/// `$QUADSYNC_LOG_DIR` wins; otherwise `$XDG_CACHE_HOME/quadsync/`, then
/// `~/.cache/quadsync/`, then `./.cache/quadsync/` when `HOME` is unset.
pub(super) fn log_dir() -> Option<PathBuf> {
    let dir = std::env::var_os(LOG_DIR_ENV).map_or_else(
        || {
            std::env::var_os("XDG_CACHE_HOME")
                .map_or_else(
                    || {
                        std::env::var_os("HOME")
                            .map_or_else(|| PathBuf::from("."), PathBuf::from)
                            .join(".cache")
                    },
                    PathBuf::from,
                )
                .join("quadsync")
        },
        PathBuf::from,
    );
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Path of the log file for `command`.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    Some(log_dir()?.join(format!("{command}.log")))
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `HH:MM:SS`.
pub(super) fn format_utc_time() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}
