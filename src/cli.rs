//! Command-line definition.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_ENV_FILE;

/// Top-level CLI entry point for the quadlet reconciler.
#[derive(Parser, Debug)]
#[command(
    name = "quadsync",
    about = "GitOps reconciler for rootless Podman quadlets",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Environment file with QUADSYNC_* settings
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync the repository and reconcile deployments
    Sync(SyncOpts),
    /// Validate a unit tree without touching the host
    Check(CheckOpts),
    /// Print a unit file merged with its directory's transform
    Augment(AugmentOpts),
    /// Force a deployment to be re-applied on the next sync
    Redeploy(RedeployOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Check(_) => "check",
            Self::Augment(_) => "augment",
            Self::Redeploy(_) => "redeploy",
            Self::Version => "version",
        }
    }
}

/// Options for the `sync` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SyncOpts {
    /// Run the full cycle even if the repository did not change
    #[arg(long)]
    pub force: bool,
}

/// Options for the `check` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CheckOpts {
    /// Unit tree to validate
    pub dir: PathBuf,
}

/// Options for the `augment` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct AugmentOpts {
    /// Unit file inside a transform-matched subdirectory
    pub file: PathBuf,

    /// Transform directory (defaults to QUADSYNC_TRANSFORMS_DIR)
    #[arg(long)]
    pub transforms: Option<PathBuf>,
}

/// Options for the `redeploy` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RedeployOpts {
    /// Deployment name
    pub name: String,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_sync_force() {
        let cli = Cli::parse_from(["quadsync", "sync", "--force"]);
        assert!(matches!(cli.command, Command::Sync(SyncOpts { force: true })));
        assert_eq!(cli.command.name(), "sync");
    }

    #[test]
    fn env_file_defaults() {
        let cli = Cli::parse_from(["quadsync", "sync"]);
        assert_eq!(cli.global.env_file, PathBuf::from(DEFAULT_ENV_FILE));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["quadsync", "check", "units", "-v", "--env-file", "/tmp/q.env"]);
        assert!(cli.verbose);
        assert_eq!(cli.global.env_file, PathBuf::from("/tmp/q.env"));
        assert!(matches!(cli.command, Command::Check(ref o) if o.dir == PathBuf::from("units")));
    }

    #[test]
    fn parse_augment_with_transforms() {
        let cli = Cli::parse_from([
            "quadsync",
            "augment",
            "edge/proxy.container",
            "--transforms",
            "/etc/t",
        ]);
        let Command::Augment(opts) = cli.command else {
            panic!("expected augment");
        };
        assert_eq!(opts.transforms, Some(PathBuf::from("/etc/t")));
    }

    #[test]
    fn parse_redeploy() {
        let cli = Cli::parse_from(["quadsync", "redeploy", "web"]);
        assert!(matches!(cli.command, Command::Redeploy(ref o) if o.name == "web"));
    }

    #[test]
    fn redeploy_requires_name() {
        assert!(Cli::try_parse_from(["quadsync", "redeploy"]).is_err());
    }
}
