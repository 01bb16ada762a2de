//! Mount utilities for target root setup.
//!
//! Handles recursive bind mounts of host resources into a target root,
//! their lazy detachment, and detection of what is already mounted.

use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use buildbox_common::error::{BoxError, Result};
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sys::stat::Mode;

use super::mountinfo;

/// Outcome of a tolerated unmount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmounted {
    /// The mount was detached.
    Detached,
    /// Nothing was mounted at the path.
    NotMounted,
}

/// Returns `true` if `path` is a mount point.
///
/// A path is mounted when it lives on a different device than its parent.
/// Same-device bind mounts are found in the live mountinfo table. Paths that
/// cannot be resolved are reported as not mounted.
pub fn is_mounted(path: &Path) -> bool {
    let Ok(path) = path.canonicalize() else {
        return false;
    };
    let Some(parent) = path.parent() else {
        return true;
    };
    let (Ok(meta), Ok(parent_meta)) = (std::fs::metadata(&path), std::fs::metadata(parent)) else {
        return false;
    };
    if meta.dev() != parent_meta.dev() {
        return true;
    }
    match mountinfo::read_mount_points() {
        Ok(points) => points.iter().any(|point| *point == path),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "mountinfo unavailable");
            false
        }
    }
}

/// A directory held open through an `O_PATH` descriptor.
///
/// Operations addressed to [`PinnedDir::fd_path`] reach the directory that
/// was opened, even if its path is swapped for a symlink afterwards.
#[derive(Debug)]
pub struct PinnedDir {
    fd: OwnedFd,
    path: PathBuf,
}

impl PinnedDir {
    /// Opens the directory at `path` without following a final symlink,
    /// then checks that the opened directory is the one named by `path`.
    ///
    /// `path` must be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if `path` is a symlink, is not a
    /// directory, or was redirected while being opened, and
    /// [`BoxError::Io`] for other failures.
    pub fn open(path: &Path) -> Result<Self> {
        let flags = OFlag::O_PATH | OFlag::O_NOFOLLOW | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC;
        let fd = open(path, flags, Mode::empty()).map_err(|e| match e {
            Errno::ELOOP | Errno::ENOTDIR => BoxError::invocation(format!(
                "mount point {} is not a plain directory",
                path.display()
            )),
            e => BoxError::Io {
                path: path.to_path_buf(),
                source: e.into(),
            },
        })?;
        let pinned = Self {
            fd,
            path: path.to_path_buf(),
        };

        let fd_path = pinned.fd_path();
        let opened = std::fs::read_link(&fd_path).map_err(|e| BoxError::Io {
            path: fd_path,
            source: e,
        })?;
        if opened != path {
            return Err(BoxError::invocation(format!(
                "mount point {} was redirected to {}",
                path.display(),
                opened.display()
            )));
        }
        Ok(pinned)
    }

    /// Path naming the pinned directory through `/proc/self/fd`.
    #[must_use]
    pub fn fd_path(&self) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", self.fd.as_raw_fd()))
    }

    /// The canonical path the directory was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Recursively bind mounts `source` onto the directory at `target`.
///
/// `target` must be canonical. It is pinned before mounting, so the bind
/// lands on that directory even if a path component is replaced meanwhile.
/// The new mount is then made a slave of its source so that detaching it
/// later cannot propagate back into the host's mount tree.
///
/// # Errors
///
/// Returns [`BoxError::Mount`] if either `mount(2)` call fails, and the
/// errors of [`PinnedDir::open`] if `target` cannot be pinned. A bind whose
/// propagation cannot be changed is detached again before returning.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    let mount_error = |e: Errno| BoxError::Mount {
        source_path: source.to_path_buf(),
        target: target.to_path_buf(),
        source: e.into(),
    };

    let mount_point = PinnedDir::open(target)?;
    mount(
        Some(source),
        mount_point.fd_path().as_path(),
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(mount_error)?;
    drop(mount_point);

    let mounted = PinnedDir::open(target)?;
    if let Err(e) = mount(
        None::<&str>,
        mounted.fd_path().as_path(),
        None::<&str>,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None::<&str>,
    ) {
        if let Err(detach) = umount2(mounted.fd_path().as_path(), MntFlags::MNT_DETACH) {
            tracing::warn!(target = %target.display(), error = %detach, "could not roll back bind mount");
        }
        return Err(mount_error(e));
    }

    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        "bind mounted"
    );
    Ok(())
}

/// Lazily detaches the mount at `target`.
///
/// A symlink at `target` is not followed.
///
/// # Errors
///
/// Returns [`BoxError::Unmount`] if the unmount fails for any reason other
/// than nothing being mounted at `target`.
pub fn unmount(target: &Path) -> Result<Unmounted> {
    match umount2(target, MntFlags::MNT_DETACH | MntFlags::UMOUNT_NOFOLLOW) {
        Ok(()) => {
            tracing::info!(target = %target.display(), "unmounted");
            Ok(Unmounted::Detached)
        }
        Err(Errno::EINVAL | Errno::ENOENT) => {
            tracing::warn!(target = %target.display(), "not mounted, nothing to do");
            Ok(Unmounted::NotMounted)
        }
        Err(e) => Err(BoxError::Unmount {
            target: target.to_path_buf(),
            source: e.into(),
        }),
    }
}
