//! Unified error type for the build-box workspace.
//!
//! Every library crate reports failures through [`BoxError`]. The CLI maps
//! each variant onto one of the two reserved exit codes.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::{EXIT_INVOCATION, EXIT_RUNTIME};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BoxError {
    /// The command was invoked with a bad or incomplete configuration.
    #[error("invalid invocation: {message}")]
    Invocation {
        /// Description of what is wrong with the invocation.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A mount point required by the requested mount set does not exist.
    #[error("mount point {target} does not exist")]
    MountTargetMissing {
        /// Missing directory inside the target root.
        target: PathBuf,
    },

    /// A bind mount failed.
    #[error("failed to bind mount {source_path} on {target}: {source}")]
    Mount {
        /// Host path being exposed.
        source_path: PathBuf,
        /// Mount point inside the target root.
        target: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// An unmount failed for a path that was mounted.
    #[error("failed to unmount {target}: {source}")]
    Unmount {
        /// Mount point being torn down.
        target: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Switching to the requested identity is impossible or failed.
    #[error("cannot switch to uid {uid}: {message}")]
    Privilege {
        /// Requested user id.
        uid: u32,
        /// Description of the failure.
        message: String,
    },

    /// The program could not be started after the identity switch.
    #[error("cannot execute {command}: {source}")]
    ChildExecution {
        /// Program that failed to start.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The program ran but did not exit successfully.
    #[error("{command} {status}")]
    ChildExit {
        /// Program that was run.
        command: String,
        /// Human-readable termination status.
        status: String,
    },

    /// A process-management primitive (pipe, fork, wait) failed.
    #[error("{operation} failed: {source}")]
    Process {
        /// Name of the failing operation.
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },
}

impl BoxError {
    /// Shorthand for an [`BoxError::Invocation`] error.
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`BoxError::Privilege`] error.
    pub fn privilege(uid: u32, message: impl Into<String>) -> Self {
        Self::Privilege {
            uid,
            message: message.into(),
        }
    }

    /// Returns the process exit code reserved for this kind of failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Invocation { .. } => EXIT_INVOCATION,
            _ => EXIT_RUNTIME,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BoxError>;
