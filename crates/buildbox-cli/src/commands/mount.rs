//! `build-box mount` — bind mount host resources into a target.

use std::path::Path;

use anyhow::Context;
use buildbox_common::constants::SYSTEM_ROOT;
use buildbox_core::orchestrator;
use clap::Args;

use crate::commands::session::{Session, TargetArgs};
use crate::output;

/// Arguments for the `mount` command.
#[derive(Args, Debug)]
pub struct MountArgs {
    /// Target and mounts to set up.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Show what would be mounted without touching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the plan or report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Mounts the selected resources, skipping those already in place.
///
/// # Errors
///
/// Returns an error if the target is unusable or a mount fails. Mounts
/// made before the failure are left in place.
pub fn execute(args: &MountArgs, session: &Session) -> anyhow::Result<()> {
    let config = session.config(&args.target)?;
    let sys_root = Path::new(SYSTEM_ROOT);

    if args.dry_run {
        let plan = orchestrator::plan(&config, sys_root)?;
        return if args.json {
            output::print_json(&plan)
        } else {
            output::print_plan(&plan).context("writing the mount plan")
        };
    }

    let report = orchestrator::mount_any(&config, sys_root)?;
    tracing::info!(
        target_dir = %config.target_dir().display(),
        mounted = report.performed.len(),
        skipped = report.skipped.len(),
        "mount finished"
    );
    if args.json {
        output::print_json(&report)?;
    }
    Ok(())
}
