//! The child side of a launch.
//!
//! Between `fork(2)` and `execve(2)` the child may only issue system calls:
//! every string, pointer array and group list it needs is prepared by the
//! parent in a [`ChildPlan`]. Failures before the program image is loaded
//! are reported to the parent over a close-on-exec status pipe as a stage
//! byte followed by the errno, so an empty pipe means `exec` succeeded.

use std::convert::Infallible;
use std::ffi::{CString, c_char};
use std::os::fd::{AsRawFd, BorrowedFd};

use buildbox_core::identity::Identity;
use nix::errno::Errno;
use nix::unistd::{chdir, chroot};

/// Step of the child's setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChildStage {
    /// Redirecting standard output into the capture pipe.
    Redirect = 1,
    /// Changing the root directory.
    Root = 2,
    /// Switching to the target identity.
    Identity = 3,
    /// Loading the program image.
    Exec = 4,
}

impl ChildStage {
    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Redirect),
            2 => Some(Self::Root),
            3 => Some(Self::Identity),
            4 => Some(Self::Exec),
            _ => None,
        }
    }
}

/// A failure reported by the child before its program ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildFailure {
    /// Step that failed.
    pub stage: ChildStage,
    /// Error returned by the failing call.
    pub errno: Errno,
}

impl ChildFailure {
    /// Size of an encoded report.
    pub const ENCODED_LEN: usize = 5;

    const fn new(stage: ChildStage, errno: Errno) -> Self {
        Self { stage, errno }
    }

    /// Encodes the report for the status pipe.
    #[must_use]
    pub fn encode(self) -> [u8; Self::ENCODED_LEN] {
        let errno = (self.errno as i32).to_be_bytes();
        [self.stage as u8, errno[0], errno[1], errno[2], errno[3]]
    }

    /// Decodes a report read from the status pipe.
    ///
    /// Returns `None` for an empty or malformed report.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let &[stage, a, b, c, d] = bytes else {
            return None;
        };
        let stage = ChildStage::from_byte(stage)?;
        Some(Self::new(stage, Errno::from_raw(i32::from_be_bytes([a, b, c, d]))))
    }
}

/// Everything the child needs, allocated before the fork.
#[derive(Debug)]
pub struct ChildPlan {
    identity: Identity,
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    root: Option<CString>,
    workdir: Option<CString>,
}

impl ChildPlan {
    /// Bundles the prepared child state.
    #[must_use]
    pub fn new(
        identity: Identity,
        program: CString,
        argv: Vec<CString>,
        envp: Vec<CString>,
        root: Option<CString>,
        workdir: Option<CString>,
    ) -> Self {
        Self {
            identity,
            program,
            argv,
            envp,
            root,
            workdir,
        }
    }

    /// Builds the pointer arrays handed to `execve`.
    #[must_use]
    pub fn pointers(&self) -> ExecPointers<'_> {
        ExecPointers {
            plan: self,
            argv: null_terminated(&self.argv),
            envp: null_terminated(&self.envp),
        }
    }
}

/// `NULL`-terminated pointer arrays borrowed from a [`ChildPlan`].
#[derive(Debug)]
pub struct ExecPointers<'a> {
    plan: &'a ChildPlan,
    argv: Vec<*const c_char>,
    envp: Vec<*const c_char>,
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Runs the child side of a launch. Never returns.
///
/// Order: redirect stdout, change root, switch identity, enter the working
/// directory, exec. The identity switch strictly precedes the exec; there is
/// no path that reaches `execve` without it succeeding first.
pub fn exec_child(pointers: &ExecPointers<'_>, stdout: Option<BorrowedFd<'_>>, status: BorrowedFd<'_>) -> ! {
    let Err(failure) = prepare_and_exec(pointers, stdout);
    let _ = nix::unistd::write(status, &failure.encode());
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, both owned
    // by the parent's copy of this address space.
    unsafe { libc::_exit(127) }
}

fn prepare_and_exec(
    pointers: &ExecPointers<'_>,
    stdout: Option<BorrowedFd<'_>>,
) -> Result<Infallible, ChildFailure> {
    let plan = pointers.plan;

    if let Some(fd) = stdout {
        // SAFETY: both descriptors are open for the lifetime of this call.
        if unsafe { libc::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
            return Err(ChildFailure::new(ChildStage::Redirect, Errno::last()));
        }
    }

    if let Some(root) = &plan.root {
        chroot(root.as_c_str()).map_err(|e| ChildFailure::new(ChildStage::Root, e))?;
        chdir(c"/").map_err(|e| ChildFailure::new(ChildStage::Root, e))?;
    }

    plan.identity
        .switch()
        .map_err(|e| ChildFailure::new(ChildStage::Identity, e))?;

    if let Some(dir) = &plan.workdir {
        if chdir(dir.as_c_str()).is_err() {
            let _ = chdir(c"/");
        }
    }

    // SAFETY: program, argv and envp are NUL-terminated strings kept alive
    // by `plan`; both pointer arrays end with a null pointer.
    unsafe {
        let _ = libc::execve(plan.program.as_ptr(), pointers.argv.as_ptr(), pointers.envp.as_ptr());
    }
    Err(ChildFailure::new(ChildStage::Exec, Errno::last()))
}
