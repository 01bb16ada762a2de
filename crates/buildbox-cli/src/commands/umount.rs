//! `build-box umount` — remove the bind mounts from a target.

use std::path::Path;

use buildbox_common::constants::SYSTEM_ROOT;
use buildbox_core::orchestrator;
use clap::Args;

use crate::commands::session::{Session, TargetArgs};
use crate::output;

/// Arguments for the `umount` command.
#[derive(Args, Debug)]
pub struct UmountArgs {
    /// Target and mounts to tear down.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Unmounts the selected resources in reverse mount order.
///
/// Resources that are not mounted are skipped, so running this twice is
/// harmless.
///
/// # Errors
///
/// Returns an error if the target is unusable or an unmount fails.
pub fn execute(args: &UmountArgs, session: &Session) -> anyhow::Result<()> {
    let config = session.config(&args.target)?;
    let report = orchestrator::umount_any(&config, Path::new(SYSTEM_ROOT))?;
    if report.is_noop() {
        tracing::info!(target_dir = %config.target_dir().display(), "nothing to unmount");
    }
    if args.json {
        output::print_json(&report)?;
    }
    Ok(())
}
