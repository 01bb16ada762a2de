//! Account lookup and identity switching.
//!
//! Everything that may allocate or read the account database happens when
//! an [`Identity`] is resolved, in the parent. [`Identity::switch`] only
//! issues system calls, so it is safe to run in a forked child.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use buildbox_common::error::{BoxError, Result};
use nix::errno::Errno;
use nix::unistd::{Gid, Uid, User, getgrouplist, geteuid, getuid, setgid, setgroups, setuid};

/// A resolved account that a process can switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    uid: Uid,
    gid: Gid,
    name: String,
    home: PathBuf,
    shell: PathBuf,
    groups: Vec<Gid>,
}

impl Identity {
    /// Resolves the account with the given numeric user id.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Privilege`] if no such account exists or the
    /// account database cannot be read.
    pub fn from_uid(uid: u32) -> Result<Self> {
        let user = User::from_uid(Uid::from_raw(uid))
            .map_err(|e| BoxError::privilege(uid, format!("account lookup failed: {e}")))?
            .ok_or_else(|| BoxError::privilege(uid, "no such account"))?;
        Ok(Self::from_user(user))
    }

    /// Resolves the account with the given login name.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Invocation`] if no such account exists.
    pub fn from_name(name: &str) -> Result<Self> {
        let user = User::from_name(name)
            .map_err(|e| BoxError::invocation(format!("account lookup for '{name}' failed: {e}")))?
            .ok_or_else(|| BoxError::invocation(format!("unknown user '{name}'")))?;
        Ok(Self::from_user(user))
    }

    /// Resolves a user given either as a numeric id or as a login name.
    ///
    /// # Errors
    ///
    /// See [`Identity::from_uid`] and [`Identity::from_name`].
    pub fn resolve(user: &str) -> Result<Self> {
        user.parse::<u32>()
            .map_or_else(|_| Self::from_name(user), Self::from_uid)
    }

    /// Resolves the account of the real user id, the user who invoked us.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Privilege`] if the invoking uid has no account.
    pub fn invoking() -> Result<Self> {
        Self::from_uid(getuid().as_raw())
    }

    fn from_user(user: User) -> Self {
        let groups = CString::new(user.name.as_bytes())
            .ok()
            .and_then(|name| getgrouplist(&name, user.gid).ok())
            .unwrap_or_else(|| {
                tracing::warn!(user = %user.name, "supplementary groups unavailable");
                vec![user.gid]
            });
        Self {
            uid: user.uid,
            gid: user.gid,
            name: user.name,
            home: user.dir,
            shell: user.shell,
            groups,
        }
    }

    /// Numeric user id.
    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid.as_raw()
    }

    /// Numeric primary group id.
    #[must_use]
    pub fn gid(&self) -> u32 {
        self.gid.as_raw()
    }

    /// Login name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Home directory from the account database.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Login shell from the account database.
    #[must_use]
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Supplementary groups, including the primary group.
    #[must_use]
    pub fn groups(&self) -> &[Gid] {
        &self.groups
    }

    /// Returns `true` for the superuser account.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.uid.is_root()
    }

    /// Checks that the current process is allowed to become this identity.
    ///
    /// Root may become anyone. Everybody else may only "switch" to the
    /// identity they already have.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Privilege`] if the switch would be refused.
    pub fn ensure_switchable(&self) -> Result<()> {
        let euid = geteuid();
        if euid.is_root() || (euid == self.uid && getuid() == self.uid) {
            return Ok(());
        }
        Err(BoxError::privilege(
            self.uid(),
            format!("running as uid {euid}, only root may switch to another user"),
        ))
    }

    /// Irrevocably switches the calling process to this identity.
    ///
    /// Groups are changed before the user id, because dropping the user id
    /// first would forfeit the right to change them. After dropping root the
    /// switch is verified by trying, and failing, to regain it.
    ///
    /// Meant to run between `fork` and `exec`; it does not allocate.
    ///
    /// # Errors
    ///
    /// Returns the errno of the first failing call, or `EPERM` if the
    /// process still holds another identity afterwards.
    pub fn switch(&self) -> nix::Result<()> {
        if geteuid().is_root() {
            setgroups(&self.groups)?;
            setgid(self.gid)?;
        }
        setuid(self.uid)?;

        if getuid() != self.uid || geteuid() != self.uid {
            return Err(Errno::EPERM);
        }
        if !self.uid.is_root() && setuid(Uid::from_raw(0)).is_ok() {
            return Err(Errno::EPERM);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A uid far above any allocated account range.
    const UNKNOWN_UID: u32 = 3_999_999_999;

    #[test]
    fn resolves_root_by_id_and_name() {
        let by_id = Identity::resolve("0").unwrap();
        let by_name = Identity::resolve("root").unwrap();
        assert_eq!(by_id, by_name);
        assert!(by_id.is_root());
        assert!(by_id.groups().contains(&Gid::from_raw(by_id.gid())));
    }

    #[test]
    fn unknown_uid_is_a_privilege_error() {
        let err = Identity::from_uid(UNKNOWN_UID).unwrap_err();
        assert!(matches!(err, BoxError::Privilege { uid: UNKNOWN_UID, .. }));
    }

    #[test]
    fn unknown_name_is_an_invocation_error() {
        let err = Identity::resolve("no-such-user-for-build-box").unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));
    }

    #[test]
    fn current_identity_is_always_switchable() {
        let Ok(me) = Identity::from_uid(geteuid().as_raw()) else {
            return;
        };
        me.ensure_switchable().unwrap();
    }

    #[test]
    fn unprivileged_process_cannot_switch_to_root() {
        if geteuid().is_root() {
            return;
        }
        let root = Identity::from_uid(0).unwrap();
        let err = root.ensure_switchable().unwrap_err();
        assert!(matches!(err, BoxError::Privilege { uid: 0, .. }));
    }
}
