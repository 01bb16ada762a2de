//! # build-box — enter a target root as a user
//!
//! Bind mounts `/dev`, `/proc`, `/sys` and the invoking user's home into a
//! target directory, then lists, logs into, or runs commands inside it
//! under an unprivileged identity.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use std::process::ExitCode;

use buildbox_common::constants::EXIT_INVOCATION;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_INVOCATION)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::report_error(&err);
            ExitCode::from(output::exit_code(&err))
        }
    }
}
