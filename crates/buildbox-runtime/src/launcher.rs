//! Launching programs under another identity.
//!
//! [`Launcher`] forks one child per launch. The child optionally changes
//! its root directory, irrevocably switches to the target identity, and
//! only then executes the program. In capture mode the parent drains the
//! child's standard output into an owned buffer until end of stream, then
//! reaps the child. Standard error is always inherited.

use std::ffi::CString;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use buildbox_common::constants::DEFAULT_PATH;
use buildbox_common::error::{BoxError, Result};
use buildbox_core::filesystem::path::join_under;
use buildbox_core::identity::Identity;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, geteuid, pipe2};

use crate::process::{self, ChildFailure, ChildPlan, ChildStage};
use crate::state::LaunchState;

/// How a launched child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// The program exited with this status code.
    Exited(i32),
    /// The program was terminated by this signal.
    Signaled(Signal),
}

impl ChildStatus {
    /// Returns `true` for a zero exit status.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Returns the exit status code, if the program exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(signal) => write!(f, "was terminated by {}", signal.as_str()),
        }
    }
}

/// Captured standard output and termination status of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutput {
    /// Everything the program wrote to standard output.
    pub stdout: Vec<u8>,
    /// How the program terminated.
    pub status: ChildStatus,
}

impl LaunchOutput {
    /// Returns standard output decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// A program to run as a specific user.
#[derive(Debug, Clone)]
pub struct Launcher {
    identity: Identity,
    program: String,
    argv: Vec<String>,
    root: Option<PathBuf>,
    workdir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Launcher {
    /// Prepares to run `program` as `identity`, with `argv[0]` set to the
    /// program and a minimal environment describing the identity.
    pub fn new(identity: Identity, program: impl Into<String>) -> Self {
        let program = program.into();
        let mut env = vec![
            ("PATH".to_string(), DEFAULT_PATH.to_string()),
            ("HOME".to_string(), identity.home().display().to_string()),
            ("USER".to_string(), identity.name().to_string()),
            ("LOGNAME".to_string(), identity.name().to_string()),
            ("SHELL".to_string(), identity.shell().display().to_string()),
        ];
        if let Ok(term) = std::env::var("TERM") {
            env.push(("TERM".to_string(), term));
        }
        Self {
            identity,
            argv: vec![program.clone()],
            program,
            root: None,
            workdir: None,
            env,
        }
    }

    /// Prepares to run `program` as the account with numeric id `uid`.
    ///
    /// The account is resolved and the switch is checked here, before any
    /// process or pipe exists.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Privilege`] if the account does not exist or the
    /// current process may not switch to it.
    pub fn for_uid(uid: u32, program: impl Into<String>) -> Result<Self> {
        let identity = Identity::from_uid(uid)?;
        identity.ensure_switchable()?;
        Ok(Self::new(identity, program))
    }

    /// Replaces the whole argument vector, `argv[0]` included.
    ///
    /// An empty vector keeps the program name as `argv[0]`.
    #[must_use]
    pub fn argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        if self.argv.is_empty() {
            self.argv.push(self.program.clone());
        }
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Runs the program with `root` as its root directory.
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Starts the program in `dir` (relative to the new root), falling back
    /// to `/` if the directory cannot be entered.
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Sets or overrides an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Identity the program runs as.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the program to completion and returns its standard output.
    ///
    /// Blocks until the program has closed its output and exited. A nonzero
    /// exit or a signal is reported in [`LaunchOutput::status`], not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Privilege`] if the root change or identity switch
    /// fails, [`BoxError::ChildExecution`] if the program cannot be
    /// executed, and [`BoxError::Process`] if pipe, fork, read, or wait fail.
    pub fn fetch_output(&self) -> Result<LaunchOutput> {
        let (stdout, status) = self.launch(true)?;
        Ok(LaunchOutput { stdout, status })
    }

    /// Runs the program to completion with standard output inherited.
    ///
    /// # Errors
    ///
    /// Same as [`Launcher::fetch_output`].
    pub fn run(&self) -> Result<ChildStatus> {
        self.launch(false).map(|(_, status)| status)
    }

    fn launch(&self, capture: bool) -> Result<(Vec<u8>, ChildStatus)> {
        let uid = self.identity.uid();
        self.identity.ensure_switchable()?;
        if self.root.is_some() && !geteuid().is_root() {
            return Err(BoxError::privilege(
                uid,
                "changing the root directory requires root",
            ));
        }

        let plan = self.child_plan()?;
        let pointers = plan.pointers();
        let (status_read, status_write) = pipe2(OFlag::O_CLOEXEC).map_err(process_error("pipe"))?;
        let stdout_pipe = if capture {
            Some(pipe2(OFlag::O_CLOEXEC).map_err(process_error("pipe"))?)
        } else {
            None
        };

        let mut state = LaunchState::Created;
        tracing::debug!(uid, program = %self.program, root = ?self.root, %state, "forking");

        // SAFETY: the child only issues system calls on memory prepared
        // above, then either execs or calls `_exit`.
        let child = match unsafe { fork() }.map_err(process_error("fork"))? {
            ForkResult::Child => process::exec_child(
                &pointers,
                stdout_pipe.as_ref().map(|(_, write)| write.as_fd()),
                status_write.as_fd(),
            ),
            ForkResult::Parent { child } => child,
        };
        drop(status_write);

        let captured = match stdout_pipe {
            Some((read, write)) => {
                drop(write);
                drain(read)
            }
            None => Ok(Vec::new()),
        };
        let report = drain(status_read);
        let status = reap(child)?;
        let captured = captured?;
        let report = report?;

        match ChildFailure::decode(&report) {
            None => {
                for next in [
                    LaunchState::IdentitySwitched,
                    LaunchState::Executing,
                    LaunchState::Exited,
                ] {
                    state = advance(state, next)?;
                }
                tracing::debug!(uid, program = %self.program, %status, %state, "child reaped");
                Ok((captured, status))
            }
            Some(failure) => {
                if failure.stage == ChildStage::Exec {
                    state = advance(state, LaunchState::IdentitySwitched)?;
                    state = advance(state, LaunchState::Executing)?;
                }
                state = advance(state, LaunchState::Failed)?;
                tracing::debug!(uid, program = %self.program, stage = ?failure.stage, %state, "launch failed");
                Err(self.failure_error(failure))
            }
        }
    }

    /// Resolves a bare program name against the launch `PATH`, searched
    /// inside the new root when there is one. Names containing a `/` are
    /// used as given.
    fn resolve_program(&self) -> Result<String> {
        if self.program.contains('/') {
            return Ok(self.program.clone());
        }
        let not_found = || BoxError::ChildExecution {
            command: self.program.clone(),
            source: io::ErrorKind::NotFound.into(),
        };

        let root = self.root.as_deref().unwrap_or_else(|| Path::new("/"));
        let search = self
            .env
            .iter()
            .rev()
            .find(|(key, _)| key == "PATH")
            .map_or("", |(_, value)| value.as_str());
        let dirs = std::env::split_paths(search)
            .filter(|dir| !dir.as_os_str().is_empty())
            .filter_map(|dir| join_under(root, &dir).ok());
        let host_dirs = std::env::join_paths(dirs).map_err(|_| not_found())?;

        let found = which::which_in(&self.program, Some(host_dirs), root).map_err(|_| not_found())?;
        let inside = found.strip_prefix(root).map_err(|_| not_found())?;
        let resolved = Path::new("/").join(inside).display().to_string();
        tracing::debug!(program = %self.program, %resolved, "program resolved");
        Ok(resolved)
    }

    fn child_plan(&self) -> Result<ChildPlan> {
        let program = c_string(self.resolve_program()?.as_bytes())?;
        let argv = self
            .argv
            .iter()
            .map(|arg| c_string(arg.as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        let envp = self
            .env
            .iter()
            .map(|(key, value)| c_string(format!("{key}={value}").as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        let root = self.root.as_deref().map(path_c_string).transpose()?;
        let workdir = self.workdir.as_deref().map(path_c_string).transpose()?;
        Ok(ChildPlan::new(
            self.identity.clone(),
            program,
            argv,
            envp,
            root,
            workdir,
        ))
    }

    fn failure_error(&self, failure: ChildFailure) -> BoxError {
        let uid = self.identity.uid();
        match failure.stage {
            ChildStage::Redirect => BoxError::Process {
                operation: "redirecting standard output",
                source: failure.errno.into(),
            },
            ChildStage::Root => BoxError::privilege(
                uid,
                format!(
                    "cannot change root to {}: {}",
                    self.root.as_deref().unwrap_or(Path::new("/")).display(),
                    failure.errno.desc()
                ),
            ),
            ChildStage::Identity => BoxError::privilege(
                uid,
                format!("identity switch failed: {}", failure.errno.desc()),
            ),
            ChildStage::Exec => BoxError::ChildExecution {
                command: self.program.clone(),
                source: failure.errno.into(),
            },
        }
    }
}

/// Runs `cmd` with argument vector `argv` as `uid` and captures its
/// standard output.
///
/// The account behind `uid` is validated before anything is spawned.
///
/// # Errors
///
/// See [`Launcher::for_uid`] and [`Launcher::fetch_output`].
pub fn runas_fetch_output(uid: u32, cmd: &str, argv: &[String]) -> Result<LaunchOutput> {
    Launcher::for_uid(uid, cmd)?.argv(argv.iter().cloned()).fetch_output()
}

fn advance(state: LaunchState, next: LaunchState) -> Result<LaunchState> {
    state.advance(next).map_err(|e| BoxError::Process {
        operation: "launch bookkeeping",
        source: std::io::Error::other(e),
    })
}

fn process_error(operation: &'static str) -> impl Fn(Errno) -> BoxError {
    move |e| BoxError::Process {
        operation,
        source: e.into(),
    }
}

/// Reads `fd` until end of stream into a buffer that grows as needed.
fn drain(fd: OwnedFd) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let _ = File::from(fd)
        .read_to_end(&mut buf)
        .map_err(|e| BoxError::Process {
            operation: "reading child output",
            source: e,
        })?;
    Ok(buf)
}

fn reap(child: Pid) -> Result<ChildStatus> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ChildStatus::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ChildStatus::Signaled(signal)),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => return Err(process_error("waitpid")(e)),
        }
    }
}

fn c_string(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| {
        BoxError::invocation(format!(
            "'{}' contains a NUL byte",
            String::from_utf8_lossy(bytes)
        ))
    })
}

fn path_c_string(path: &Path) -> Result<CString> {
    c_string(path.as_os_str().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Option<Identity> {
        Identity::from_uid(geteuid().as_raw()).ok()
    }

    #[test]
    fn argv_defaults_to_the_program_name() {
        let Some(identity) = me() else { return };
        let launcher = Launcher::new(identity, "/bin/echo").argv(Vec::<String>::new());
        assert_eq!(launcher.argv, ["/bin/echo"]);
    }

    #[test]
    fn environment_describes_the_target_identity() {
        let Some(identity) = me() else { return };
        let name = identity.name().to_string();
        let launcher = Launcher::new(identity, "/bin/true").env("PATH", "/bin");
        let lookup = |key: &str| {
            launcher
                .env
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(lookup("USER"), Some(name.clone()));
        assert_eq!(lookup("LOGNAME"), Some(name));
        assert_eq!(lookup("PATH").as_deref(), Some("/bin"));
        assert_eq!(launcher.env.iter().filter(|(k, _)| k == "PATH").count(), 1);
    }

    #[test]
    fn nul_bytes_are_rejected_before_forking() {
        let Some(identity) = me() else { return };
        let err = Launcher::new(identity, "/bin/echo")
            .arg("a\0b")
            .fetch_output()
            .unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));
    }

    #[test]
    fn status_display_names_the_signal() {
        assert_eq!(ChildStatus::Exited(3).to_string(), "exited with status 3");
        assert_eq!(
            ChildStatus::Signaled(Signal::SIGKILL).to_string(),
            "was terminated by SIGKILL"
        );
        assert!(ChildStatus::Exited(0).success());
        assert_eq!(ChildStatus::Signaled(Signal::SIGTERM).code(), None);
    }
}
