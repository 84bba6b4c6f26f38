//! Core logging types: deployment entries, status, and the [`Log`] trait.

/// Per-name outcome for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentEntry {
    /// Deployment name.
    pub name: String,
    /// Final status of the name in this cycle.
    pub status: Status,
    /// Optional detail message (e.g., error description).
    pub message: Option<String>,
}

/// What a reconcile cycle did with one deployment name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// User provisioned and unit deployed for the first time.
    Created,
    /// Unit content changed (or a redeploy was requested) and was re-applied.
    Updated,
    /// Content hash matched the persisted record; no host calls were made.
    Unchanged,
    /// Name disappeared from the repository; unit and user were removed.
    Removed,
    /// Applying, removing, or parsing the name failed.
    Failed,
}

impl Status {
    /// Lowercase label used in summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Removed => "removed",
            Self::Failed => "failed",
        }
    }
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) is the production implementation; tests
/// substitute a capturing log so host and reconcile code can log without a
/// global subscriber.
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Record a per-name outcome for the summary.
    fn record(&self, name: &str, status: Status, message: Option<&str>);
}
