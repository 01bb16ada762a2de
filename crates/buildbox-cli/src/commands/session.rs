//! Per-invocation context shared by all commands.
//!
//! The helper may run setuid root, so everything here is decided from the
//! real uid of the invoking user: where their targets live, which target
//! directories they may use, and whom they may run commands as.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use buildbox_common::config::BoxConfig;
use buildbox_common::constants::DEFAULT_TARGET_PREFIX_SUBDIR;
use buildbox_common::error::{BoxError, Result};
use buildbox_common::types::MountSet;
use buildbox_core::filesystem::path::join_under;
use buildbox_core::identity::Identity;
use clap::Args;

/// Target selection shared by `login`, `run`, `mount` and `umount`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Target name below the target prefix, `.` for the prefix itself, or
    /// an absolute path.
    pub target: String,

    /// Mounts to manage: `all`, `none`, or a comma list of dev,proc,sys,home.
    #[arg(short = 'm', long = "mount", value_name = "LIST", default_value = "all")]
    pub mount: MountSet,
}

/// The invoking user and the target prefix they work with.
#[derive(Debug, Clone)]
pub struct Session {
    invoker: Identity,
    prefix: PathBuf,
}

impl Session {
    /// Resolves the invoking user and the target prefix.
    ///
    /// Without an explicit prefix, targets live in `~/.bolt/targets` of
    /// the invoking user.
    ///
    /// # Errors
    ///
    /// Returns an error if the real uid has no account entry.
    pub fn new(targets: Option<PathBuf>) -> Result<Self> {
        let invoker = Identity::invoking()?;
        let prefix =
            targets.unwrap_or_else(|| invoker.home().join(DEFAULT_TARGET_PREFIX_SUBDIR));
        tracing::debug!(user = invoker.name(), prefix = %prefix.display(), "session resolved");
        Ok(Self::with_invoker(invoker, prefix))
    }

    /// Builds a session for an already resolved invoker.
    #[must_use]
    pub const fn with_invoker(invoker: Identity, prefix: PathBuf) -> Self {
        Self { invoker, prefix }
    }

    /// Returns the invoking user.
    #[must_use]
    pub const fn invoker(&self) -> &Identity {
        &self.invoker
    }

    /// Returns the target prefix.
    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Resolves a target name to its directory.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if a relative name climbs out of
    /// the prefix.
    pub fn target_dir(&self, name: &str) -> Result<PathBuf> {
        let name = Path::new(name);
        if name.is_absolute() {
            return Ok(name.to_path_buf());
        }
        join_under(&self.prefix, name)
    }

    /// Builds the mount configuration for a target.
    ///
    /// The home mount always exposes the invoking user's home directory.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if the target directory is missing,
    /// is not a directory, or belongs to someone else.
    pub fn config(&self, args: &TargetArgs) -> Result<BoxConfig> {
        let dir = self.target_dir(&args.target)?;
        self.ensure_usable(&dir)?;
        BoxConfig::builder(dir)
            .home_dir(self.invoker.home())
            .mounts(args.mount)
            .build()
    }

    /// Resolves the identity a command runs as.
    ///
    /// Only root may name another user; everyone else runs as themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is unknown, or
    /// [`BoxError::Invocation`] if a non-root invoker names another user.
    pub fn run_identity(&self, user: Option<&str>) -> Result<Identity> {
        let Some(user) = user else {
            return Ok(self.invoker.clone());
        };
        let identity = Identity::resolve(user)?;
        if !self.invoker.is_root() && identity.uid() != self.invoker.uid() {
            return Err(BoxError::invocation(format!(
                "{} may not run commands as {}",
                self.invoker.name(),
                identity.name()
            )));
        }
        Ok(identity)
    }

    fn ensure_usable(&self, dir: &Path) -> Result<()> {
        let meta = fs::metadata(dir).map_err(|_| {
            BoxError::invocation(format!("target {} does not exist", dir.display()))
        })?;
        if !meta.is_dir() {
            return Err(BoxError::invocation(format!(
                "target {} is not a directory",
                dir.display()
            )));
        }
        if !self.invoker.is_root() && meta.uid() != self.invoker.uid() {
            return Err(BoxError::invocation(format!(
                "target {} is not owned by {}",
                dir.display(),
                self.invoker.name()
            )));
        }
        Ok(())
    }
}
