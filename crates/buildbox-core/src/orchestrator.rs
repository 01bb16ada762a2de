//! Mount orchestration for a target root.
//!
//! Turns a [`BoxConfig`] into bind mounts, one per selected resource, in
//! the fixed order dev, proc, sys, home. Teardown runs in the exact
//! reverse. Both directions consult the live mount state before acting, so
//! repeating either one is a no-op.

use std::path::{Path, PathBuf};

use buildbox_common::config::BoxConfig;
use buildbox_common::error::{BoxError, Result};
use buildbox_common::types::MountKind;
use serde::Serialize;

use crate::filesystem::mount::{self, Unmounted};
use crate::filesystem::path::join_under;

/// One bind mount derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountDescriptor {
    /// Resource being exposed.
    pub kind: MountKind,
    /// Host path.
    pub source: PathBuf,
    /// Mount point inside the target root.
    pub target: PathBuf,
}

/// Computes the descriptor for a single mount kind.
///
/// # Errors
///
/// Returns [`BoxError::Invocation`] if `home` is requested without a home
/// directory, or if the home directory would escape or cover the whole
/// target root (a home of `/`).
pub fn descriptor(config: &BoxConfig, sys_root: &Path, kind: MountKind) -> Result<MountDescriptor> {
    let sub = match kind.host_dir() {
        Some(dir) => PathBuf::from(dir),
        None => config
            .home_dir()
            .ok_or_else(|| BoxError::invocation("mounting home requires a home directory"))?
            .to_path_buf(),
    };
    let target = join_under(config.target_dir(), &sub)?;
    if target == config.target_dir() {
        return Err(BoxError::invocation(format!(
            "{kind} directory {} would be mounted over the whole target root",
            sub.display()
        )));
    }
    Ok(MountDescriptor {
        kind,
        source: join_under(sys_root, &sub)?,
        target,
    })
}

/// Computes all descriptors for the configuration, in mount order.
///
/// # Errors
///
/// Returns an error if any single descriptor cannot be computed.
pub fn plan(config: &BoxConfig, sys_root: &Path) -> Result<Vec<MountDescriptor>> {
    config
        .mounts()
        .iter()
        .map(|kind| descriptor(config, sys_root, kind))
        .collect()
}

/// Access to the mount table.
///
/// [`KernelMountTable`] talks to the kernel. Tests substitute a recording
/// table.
pub trait MountTable {
    /// Returns `true` if something is mounted at `path`.
    fn is_mounted(&self, path: &Path) -> bool;

    /// Bind mounts `source` onto `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Mount`] if the bind fails.
    fn bind(&self, source: &Path, target: &Path) -> Result<()>;

    /// Detaches whatever is mounted at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Unmount`] if the unmount fails.
    fn unmount(&self, target: &Path) -> Result<Unmounted>;
}

/// The kernel's mount table.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelMountTable;

impl MountTable for KernelMountTable {
    fn is_mounted(&self, path: &Path) -> bool {
        mount::is_mounted(path)
    }

    fn bind(&self, source: &Path, target: &Path) -> Result<()> {
        mount::bind_mount(source, target)
    }

    fn unmount(&self, target: &Path) -> Result<Unmounted> {
        mount::unmount(target)
    }
}

/// What an orchestration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountReport {
    /// Descriptors that required a mount or unmount, in execution order.
    pub performed: Vec<MountDescriptor>,
    /// Descriptors that were already in the desired state.
    pub skipped: Vec<MountDescriptor>,
}

impl MountReport {
    /// Returns `true` if nothing had to be done.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.performed.is_empty()
    }
}

/// Mounts and unmounts host resources inside a target root.
#[derive(Debug, Clone)]
pub struct MountOrchestrator<T = KernelMountTable> {
    table: T,
    sys_root: PathBuf,
}

impl MountOrchestrator<KernelMountTable> {
    /// Creates an orchestrator backed by the kernel, exposing resources of
    /// the filesystem rooted at `sys_root`.
    pub fn new(sys_root: impl Into<PathBuf>) -> Self {
        Self::with_table(KernelMountTable, sys_root)
    }
}

impl<T: MountTable> MountOrchestrator<T> {
    /// Creates an orchestrator backed by a custom mount table.
    pub fn with_table(table: T, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            table,
            sys_root: sys_root.into(),
        }
    }

    /// Returns the underlying mount table.
    pub const fn table(&self) -> &T {
        &self.table
    }

    /// Mounts every selected resource that is not mounted yet.
    ///
    /// Stops at the first failure. Mounts performed before it stay in
    /// place and are picked up as already mounted by the next run.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if the configuration does not match
    /// the filesystem, [`BoxError::MountTargetMissing`] if a mount point is
    /// absent from the target root, or [`BoxError::Mount`] for the first
    /// bind that fails.
    pub fn mount_any(&self, config: &BoxConfig) -> Result<MountReport> {
        config.validate()?;
        let root = canonical(config.target_dir())?;
        let mut report = MountReport::default();

        for desc in plan(config, &self.sys_root)? {
            let mount_point = ensure_mount_point(&root, &desc.target)?;
            if self.table.is_mounted(&mount_point) {
                tracing::debug!(kind = %desc.kind, target = %desc.target.display(), "already mounted");
                report.skipped.push(desc);
                continue;
            }
            self.table.bind(&desc.source, &mount_point)?;
            if !self.table.is_mounted(&mount_point) {
                return Err(BoxError::Mount {
                    source_path: desc.source,
                    target: desc.target,
                    source: std::io::Error::other("mount point not visible after bind"),
                });
            }
            report.performed.push(desc);
        }
        Ok(report)
    }

    /// Unmounts every selected resource that is mounted, in reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if the target directory is missing
    /// or a mount point resolves outside the target root, or
    /// [`BoxError::Unmount`] for the first unmount that fails.
    pub fn umount_any(&self, config: &BoxConfig) -> Result<MountReport> {
        config.validate()?;
        let root = canonical(config.target_dir())?;
        let descriptors = config
            .mounts()
            .iter_rev()
            .map(|kind| descriptor(config, &self.sys_root, kind))
            .collect::<Result<Vec<_>>>()?;
        let mut report = MountReport::default();

        for desc in descriptors {
            let mount_point = desc
                .target
                .exists()
                .then(|| confine(&root, &desc.target))
                .transpose()?;
            let Some(mount_point) = mount_point.filter(|p| self.table.is_mounted(p)) else {
                tracing::debug!(kind = %desc.kind, target = %desc.target.display(), "not mounted");
                report.skipped.push(desc);
                continue;
            };
            match self.table.unmount(&mount_point)? {
                Unmounted::Detached => report.performed.push(desc),
                Unmounted::NotMounted => report.skipped.push(desc),
            }
        }
        Ok(report)
    }
}

/// Mounts the configured resources using the kernel mount table.
///
/// # Errors
///
/// See [`MountOrchestrator::mount_any`].
pub fn mount_any(config: &BoxConfig, sys_root: &Path) -> Result<MountReport> {
    MountOrchestrator::new(sys_root).mount_any(config)
}

/// Unmounts the configured resources using the kernel mount table.
///
/// # Errors
///
/// See [`MountOrchestrator::umount_any`].
pub fn umount_any(config: &BoxConfig, sys_root: &Path) -> Result<MountReport> {
    MountOrchestrator::new(sys_root).umount_any(config)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| BoxError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Checks that `target` is an existing directory and returns its resolved
/// path, see [`confine`].
fn ensure_mount_point(root: &Path, target: &Path) -> Result<PathBuf> {
    if !target.is_dir() {
        return Err(BoxError::MountTargetMissing {
            target: target.to_path_buf(),
        });
    }
    confine(root, target)
}

/// Resolves `target` and checks that it lies strictly below the canonical
/// `root`, so a symlink planted in the target root cannot redirect a mount
/// or an unmount.
fn confine(root: &Path, target: &Path) -> Result<PathBuf> {
    let resolved = canonical(target)?;
    if resolved == root || !resolved.starts_with(root) {
        return Err(BoxError::invocation(format!(
            "mount point {} resolves to {} outside the target root",
            target.display(),
            resolved.display()
        )));
    }
    Ok(resolved)
}
