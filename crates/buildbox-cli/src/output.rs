//! Formatted output helpers for CLI commands.
//!
//! Results go to stdout; diagnostics go to stderr so captured command
//! output stays clean.

use std::io::{self, Write};

use buildbox_common::constants::{BIN_NAME, EXIT_RUNTIME};
use buildbox_common::error::BoxError;
use buildbox_core::orchestrator::MountDescriptor;
use buildbox_runtime::targets::TargetEntry;
use serde::Serialize;

/// Maps an error to the process exit code.
///
/// Errors that do not originate from the helper itself count as runtime
/// failures.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<BoxError>()
        .map_or(EXIT_RUNTIME, BoxError::exit_code)
}

/// Prints an error and its causes to stderr.
pub fn report_error(err: &anyhow::Error) {
    let _ = writeln!(io::stderr().lock(), "{BIN_NAME}: {err:#}");
}

/// Writes raw bytes to stdout.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn write_stdout(bytes: &[u8]) -> io::Result<()> {
    write_to(&mut io::stdout().lock(), bytes)
}

/// Prints any serializable value as pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    write_stdout(rendered.as_bytes())?;
    Ok(())
}

/// Prints one `name (machine)` line per target.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn print_targets(entries: &[TargetEntry]) -> io::Result<()> {
    write_stdout(format_targets(entries).as_bytes())
}

/// Prints one line per planned mount.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn print_plan(plan: &[MountDescriptor]) -> io::Result<()> {
    write_stdout(format_plan(plan).as_bytes())
}

fn write_to(out: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    out.write_all(bytes)?;
    out.flush()
}

/// Renders targets as `name (machine)` lines.
#[must_use]
pub fn format_targets(entries: &[TargetEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{} ({})\n", entry.name, entry.machine))
        .collect()
}

/// Renders mounts as aligned `kind  source -> target` lines.
#[must_use]
pub fn format_plan(plan: &[MountDescriptor]) -> String {
    plan.iter()
        .map(|d| {
            format!(
                "{:<5} {} -> {}\n",
                d.kind.name(),
                d.source.display(),
                d.target.display()
            )
        })
        .collect()
}
