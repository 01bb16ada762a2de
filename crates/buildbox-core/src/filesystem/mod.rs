//! Filesystem management for target roots.
//!
//! Provides bind mount and unmount wrappers, mount point detection, the
//! mountinfo reader, and path joining that cannot leave a base directory.

pub mod mount;
pub mod mountinfo;
pub mod path;
