//! `build-box list` — show the targets and the machine each was built for.

use anyhow::Context;
use buildbox_runtime::targets;
use clap::Args;

use crate::commands::session::Session;
use crate::output;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the targets as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Lists the targets below the target prefix.
///
/// The prefix is read with the invoking user's identity.
///
/// # Errors
///
/// Returns an error if the listing programs cannot be launched.
pub fn execute(args: &ListArgs, session: &Session) -> anyhow::Result<()> {
    let entries = targets::list_targets(session.invoker(), session.prefix())?;
    if args.json {
        output::print_json(&entries)
    } else {
        output::print_targets(&entries).context("writing the target list")
    }
}
