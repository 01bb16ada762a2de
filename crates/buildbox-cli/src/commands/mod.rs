//! CLI command definitions and dispatch.

pub mod list;
pub mod login;
pub mod mount;
pub mod run;
pub mod session;
pub mod umount;

use std::path::PathBuf;

use anyhow::Context;
use buildbox_common::constants::{BIN_NAME, VERSION};
use clap::{Parser, Subcommand};

use crate::commands::session::Session;

/// build-box — mount host resources into a target root and work inside it.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the targets (default: ~/.bolt/targets).
    #[arg(short = 't', long = "targets", global = true, value_name = "DIR")]
    pub targets: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the targets and the machine each was built for.
    List(list::ListArgs),
    /// Open a login shell inside a target.
    Login(login::LoginArgs),
    /// Run a command inside a target and print its output.
    Run(run::RunArgs),
    /// Bind mount host resources into a target.
    Mount(mount::MountArgs),
    /// Remove the bind mounts from a target.
    Umount(umount::UmountArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the invoking user cannot be resolved or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let session = Session::new(cli.targets)?;
    match cli.command {
        Command::List(args) => list::execute(&args, &session),
        Command::Login(args) => login::execute(args, &session),
        Command::Run(args) => run::execute(args, &session),
        Command::Mount(args) => mount::execute(&args, &session),
        Command::Umount(args) => umount::execute(&args, &session),
    }
}

/// Keeps the helper alive on Ctrl-C so it can reap the child, which
/// receives the interrupt itself as part of the foreground process group.
fn ignore_interrupts() -> anyhow::Result<()> {
    ctrlc::set_handler(|| tracing::debug!("interrupt left to the child"))
        .context("installing the interrupt handler")
}
