//! `quadsync` binary entry point.
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use quadsync::{cli, commands, logging};

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    if matches!(args.command, cli::Command::Version) {
        commands::version::run();
        return Ok(());
    }

    logging::init_subscriber(args.verbose, args.command.name());
    let log = Arc::new(logging::Logger::new(args.command.name()));

    match args.command {
        cli::Command::Sync(opts) => commands::sync::run(&args.global, &opts, &log),
        cli::Command::Check(opts) => commands::check::run(&opts, &log),
        cli::Command::Augment(opts) => commands::augment::run(&args.global, &opts, &log),
        cli::Command::Redeploy(opts) => commands::redeploy::run(&args.global, &opts, &log),
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
