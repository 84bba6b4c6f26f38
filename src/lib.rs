//! GitOps reconciler for rootless Podman quadlets.
//!
//! A Git repository of `.container` quadlet files is the desired state.
//! Every unit becomes one deployment running under its own unprivileged OS
//! account, and each `quadsync sync` converges the host toward the
//! repository: new names are provisioned, changed content is rewritten and
//! restarted, and names that vanished are torn down.
//!
//! The public API is organised into layers:
//!
//! - **[`ini`]**: systemd-style unit parsing and transform merging
//! - **[`desired`]**: discover units in a checkout and build the desired state
//! - **[`repo`]**, **[`host`]**, **[`state`]**: the outside world (Git, OS users and systemd, the persisted record)
//! - **[`reconcile`]**: one cycle of diff and apply
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod desired;
pub mod error;
pub mod exec;
pub mod host;
pub mod ini;
pub mod logging;
pub mod reconcile;
pub mod repo;
pub mod state;
pub mod validate;
