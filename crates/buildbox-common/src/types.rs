//! Domain primitive types used across the build-box workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// A host resource that can be bind mounted into a target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host `/dev`.
    Dev,
    /// Host `/proc`.
    Proc,
    /// Host `/sys`.
    Sys,
    /// The invoking user's home directory.
    Home,
}

impl MountKind {
    /// Every kind in mount order. Teardown walks this in reverse.
    pub const ALL: [Self; 4] = [Self::Dev, Self::Proc, Self::Sys, Self::Home];

    /// Returns the lowercase name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Proc => "proc",
            Self::Sys => "sys",
            Self::Home => "home",
        }
    }

    /// Returns the host directory for kinds with a fixed location.
    #[must_use]
    pub const fn host_dir(self) -> Option<&'static str> {
        match self {
            Self::Dev => Some("dev"),
            Self::Proc => Some("proc"),
            Self::Sys => Some("sys"),
            Self::Home => None,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Dev => 1,
            Self::Proc => 2,
            Self::Sys => 4,
            Self::Home => 8,
        }
    }
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MountKind {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| BoxError::invocation(format!("unknown mount '{s}'")))
    }
}

/// A subset of [`MountKind`]s.
///
/// Iteration always yields kinds in mount order, regardless of the order
/// in which they were inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MountSet(u8);

impl MountSet {
    /// Returns the empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns the set of every mount kind.
    #[must_use]
    pub const fn all() -> Self {
        Self(0x0F)
    }

    /// Adds a kind to the set.
    pub const fn insert(&mut self, kind: MountKind) {
        self.0 |= kind.bit();
    }

    /// Removes a kind from the set.
    pub const fn remove(&mut self, kind: MountKind) {
        self.0 &= !kind.bit();
    }

    /// Returns `true` if the kind is part of the set.
    #[must_use]
    pub const fn contains(self, kind: MountKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns `true` if no kind is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the selected kinds in mount order.
    pub fn iter(self) -> impl DoubleEndedIterator<Item = MountKind> {
        MountKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }

    /// Iterates the selected kinds in teardown order.
    pub fn iter_rev(self) -> impl Iterator<Item = MountKind> {
        self.iter().rev()
    }
}

impl FromIterator<MountKind> for MountSet {
    fn from_iter<I: IntoIterator<Item = MountKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl FromStr for MountSet {
    type Err = BoxError;

    /// Parses `all`, `none`, or a comma-separated list such as `dev,proc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::all()),
            "none" | "" => Ok(Self::empty()),
            list => list.split(',').map(str::parse::<MountKind>).collect(),
        }
    }
}

impl fmt::Display for MountSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<_> = self.iter().map(MountKind::name).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_mount_order_not_insertion_order() {
        let set: MountSet = [MountKind::Home, MountKind::Dev, MountKind::Sys]
            .into_iter()
            .collect();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, [MountKind::Dev, MountKind::Sys, MountKind::Home]);
    }

    #[test]
    fn teardown_order_is_the_exact_reverse() {
        let order: Vec<_> = MountSet::all().iter_rev().collect();
        assert_eq!(
            order,
            [MountKind::Home, MountKind::Sys, MountKind::Proc, MountKind::Dev]
        );
    }

    #[test]
    fn parses_comma_lists_and_keywords() {
        let set: MountSet = "proc, dev".parse().unwrap();
        assert!(set.contains(MountKind::Dev));
        assert!(set.contains(MountKind::Proc));
        assert!(!set.contains(MountKind::Home));
        assert_eq!("all".parse::<MountSet>().unwrap(), MountSet::all());
        assert!("none".parse::<MountSet>().unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_mount_names() {
        let err = "dev,tmp".parse::<MountSet>().unwrap_err();
        assert!(matches!(err, BoxError::Invocation { .. }));
    }

    #[test]
    fn remove_clears_only_that_kind() {
        let mut set = MountSet::all();
        set.remove(MountKind::Sys);
        assert_eq!(set.to_string(), "dev,proc,home");
    }

    #[test]
    fn mount_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MountKind::Proc).unwrap();
        assert_eq!(json, "\"proc\"");
    }
}
