//! Configuration model for a single build-box invocation.
//!
//! A [`BoxConfig`] is built once by the command layer and only read
//! afterwards. The mount orchestrator and the launcher borrow it.

use std::path::{Path, PathBuf};

use crate::error::{BoxError, Result};
use crate::types::{MountKind, MountSet};

/// What to mount, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxConfig {
    target_dir: PathBuf,
    home_dir: Option<PathBuf>,
    mounts: MountSet,
}

impl BoxConfig {
    /// Starts building a configuration rooted at `target_dir`.
    pub fn builder(target_dir: impl Into<PathBuf>) -> BoxConfigBuilder {
        BoxConfigBuilder {
            target_dir: target_dir.into(),
            home_dir: None,
            mounts: MountSet::empty(),
        }
    }

    /// Directory that plays the role of `/` for the sandboxed environment.
    #[must_use]
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Home directory exposed by the `home` mount, if any.
    #[must_use]
    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    /// Resources selected for mounting.
    #[must_use]
    pub const fn mounts(&self) -> MountSet {
        self.mounts
    }

    /// Checks the configuration against the live filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if the target directory does not
    /// exist or is not a directory, or if the home directory is requested
    /// but missing.
    pub fn validate(&self) -> Result<()> {
        if !self.target_dir.is_dir() {
            return Err(BoxError::invocation(format!(
                "target directory {} does not exist",
                self.target_dir.display()
            )));
        }
        if self.mounts.contains(MountKind::Home) {
            if let Some(home) = &self.home_dir {
                if !home.is_dir() {
                    return Err(BoxError::invocation(format!(
                        "home directory {} does not exist",
                        home.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`BoxConfig`].
#[derive(Debug, Clone)]
pub struct BoxConfigBuilder {
    target_dir: PathBuf,
    home_dir: Option<PathBuf>,
    mounts: MountSet,
}

impl BoxConfigBuilder {
    /// Sets the home directory exposed by the `home` mount.
    #[must_use]
    pub fn home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    /// Replaces the selected mounts.
    #[must_use]
    pub const fn mounts(mut self, mounts: MountSet) -> Self {
        self.mounts = mounts;
        self
    }

    /// Adds one mount to the selection.
    #[must_use]
    pub const fn mount(mut self, kind: MountKind) -> Self {
        self.mounts.insert(kind);
        self
    }

    /// Finishes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if the target directory is empty, or
    /// if `home` is selected without a non-empty home directory.
    pub fn build(self) -> Result<BoxConfig> {
        if self.target_dir.as_os_str().is_empty() {
            return Err(BoxError::invocation("target directory is empty"));
        }
        let home_missing = self
            .home_dir
            .as_ref()
            .is_none_or(|home| home.as_os_str().is_empty());
        if self.mounts.contains(MountKind::Home) && home_missing {
            return Err(BoxError::invocation(
                "mounting home requires a home directory",
            ));
        }
        Ok(BoxConfig {
            target_dir: self.target_dir,
            home_dir: self.home_dir.filter(|home| !home.as_os_str().is_empty()),
            mounts: self.mounts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_empty_target_dir() {
        let err = BoxConfig::builder("").build().unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));
    }

    #[test]
    fn build_rejects_home_mount_without_home_dir() {
        let err = BoxConfig::builder("/srv/box")
            .mount(MountKind::Home)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("home directory"));

        let err = BoxConfig::builder("/srv/box")
            .home_dir("")
            .mount(MountKind::Home)
            .build()
            .unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));
    }

    #[test]
    fn build_keeps_selection_and_paths() {
        let config = BoxConfig::builder("/srv/box")
            .home_dir("/home/alice")
            .mount(MountKind::Dev)
            .mount(MountKind::Home)
            .build()
            .unwrap();
        assert_eq!(config.target_dir(), Path::new("/srv/box"));
        assert_eq!(config.home_dir(), Some(Path::new("/home/alice")));
        assert!(config.mounts().contains(MountKind::Dev));
        assert!(!config.mounts().contains(MountKind::Proc));
    }

    #[test]
    fn validate_requires_existing_target_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("missing");
        let config = BoxConfig::builder(&missing)
            .mounts(MountSet::all())
            .home_dir(scratch.path())
            .build()
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));

        let config = BoxConfig::builder(scratch.path())
            .mounts(MountSet::all())
            .home_dir(scratch.path())
            .build()
            .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn validate_requires_existing_home_when_selected() {
        let scratch = tempfile::tempdir().unwrap();
        let config = BoxConfig::builder(scratch.path())
            .home_dir(scratch.path().join("nobody"))
            .mount(MountKind::Home)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
