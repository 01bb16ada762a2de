//! `build-box login` — open a login shell inside a target.

use std::path::{Path, PathBuf};

use buildbox_common::constants::{DEFAULT_SHELL, SYSTEM_ROOT};
use buildbox_common::error::BoxError;
use buildbox_core::filesystem::path::join_under;
use buildbox_core::orchestrator;
use buildbox_runtime::launcher::Launcher;
use clap::Args;

use crate::commands::session::{Session, TargetArgs};

/// Arguments for the `login` command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Target and mounts to set up before logging in.
    #[command(flatten)]
    pub target: TargetArgs,

    /// User to log in as (name or uid). Only root may name another user.
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Shell to start instead of the account's shell.
    #[arg(long, value_name = "PATH")]
    pub shell: Option<PathBuf>,
}

/// Mounts the selected resources and runs an interactive login shell in
/// the target, with the terminal passed straight through.
///
/// # Errors
///
/// Returns an error if mounting or launching fails, or if the shell exits
/// unsuccessfully.
pub fn execute(args: LoginArgs, session: &Session) -> anyhow::Result<()> {
    let config = session.config(&args.target)?;
    let identity = session.run_identity(args.user.as_deref())?;
    let _ = orchestrator::mount_any(&config, Path::new(SYSTEM_ROOT))?;

    let shell = args
        .shell
        .unwrap_or_else(|| pick_shell(config.target_dir(), identity.shell()));
    let program = shell.display().to_string();
    tracing::info!(user = identity.name(), shell = %program, "logging in");

    let workdir = identity.home().to_path_buf();
    let launcher = Launcher::new(identity, &program)
        .argv([login_argv0(&shell)])
        .root(config.target_dir())
        .workdir(workdir);

    super::ignore_interrupts()?;
    let status = launcher.run()?;
    if !status.success() {
        return Err(BoxError::ChildExit {
            command: program,
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Returns the account shell if the target provides it, else `/bin/sh`.
fn pick_shell(target_dir: &Path, account_shell: &Path) -> PathBuf {
    let provided = !account_shell.as_os_str().is_empty()
        && join_under(target_dir, account_shell).is_ok_and(|path| path.exists());
    if provided {
        account_shell.to_path_buf()
    } else {
        tracing::debug!(shell = %account_shell.display(), "account shell missing in target");
        PathBuf::from(DEFAULT_SHELL)
    }
}

/// `argv[0]` marking the shell as a login shell, e.g. `-bash`.
fn login_argv0(shell: &Path) -> String {
    let base = shell
        .file_name()
        .map_or_else(|| shell.display().to_string(), |name| name.to_string_lossy().into_owned());
    format!("-{base}")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn account_shell_is_used_when_present_in_target() {
        let target = tempfile::tempdir().unwrap();
        fs::create_dir_all(target.path().join("bin")).unwrap();
        fs::write(target.path().join("bin/bash"), "").unwrap();

        assert_eq!(
            pick_shell(target.path(), Path::new("/bin/bash")),
            PathBuf::from("/bin/bash")
        );
    }

    #[test]
    fn missing_account_shell_falls_back_to_sh() {
        let target = tempfile::tempdir().unwrap();

        assert_eq!(
            pick_shell(target.path(), Path::new("/usr/bin/zsh")),
            PathBuf::from(DEFAULT_SHELL)
        );
        assert_eq!(pick_shell(target.path(), Path::new("")), PathBuf::from(DEFAULT_SHELL));
    }

    #[test]
    fn login_shells_get_a_dash_prefix() {
        assert_eq!(login_argv0(Path::new("/bin/bash")), "-bash");
        assert_eq!(login_argv0(Path::new("sh")), "-sh");
    }
}
