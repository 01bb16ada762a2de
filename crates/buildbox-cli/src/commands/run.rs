//! `build-box run` — run a command inside a target and print its output.

use std::path::Path;

use anyhow::Context;
use buildbox_common::constants::SYSTEM_ROOT;
use buildbox_common::error::BoxError;
use buildbox_core::orchestrator;
use buildbox_runtime::launcher::Launcher;
use clap::Args;

use crate::commands::session::{Session, TargetArgs};
use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target and mounts to set up before running.
    #[command(flatten)]
    pub target: TargetArgs,

    /// User to run as (name or uid). Only root may name another user.
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Command and its arguments.
    #[arg(required = true, trailing_var_arg = true, value_name = "CMD")]
    pub command: Vec<String>,
}

/// Mounts the selected resources, runs the command inside the target and
/// copies its standard output to ours.
///
/// Mounts stay in place afterwards; `umount` removes them.
///
/// # Errors
///
/// Returns an error if mounting or launching fails, or if the command
/// does not exit successfully.
pub fn execute(args: RunArgs, session: &Session) -> anyhow::Result<()> {
    let config = session.config(&args.target)?;
    let identity = session.run_identity(args.user.as_deref())?;
    let _ = orchestrator::mount_any(&config, Path::new(SYSTEM_ROOT))?;

    let Some(program) = args.command.first().cloned() else {
        return Err(BoxError::invocation("no command given").into());
    };
    let workdir = identity.home().to_path_buf();
    let launcher = Launcher::new(identity, &program)
        .argv(args.command)
        .root(config.target_dir())
        .workdir(workdir);

    super::ignore_interrupts()?;
    let output = launcher.fetch_output()?;
    output::write_stdout(&output.stdout).context("writing command output")?;

    if !output.status.success() {
        return Err(BoxError::ChildExit {
            command: program,
            status: output.status.to_string(),
        }
        .into());
    }
    Ok(())
}
