//! # buildbox-core
//!
//! Low-level Linux primitives for build-box.
//!
//! This crate provides safe abstractions over:
//! - **Filesystem**: recursive bind mounts, detach unmounts, mounted-state
//!   detection, and confined path joining.
//! - **Orchestration**: deciding which host resources to (un)mount into a
//!   target root, in which order, and skipping what is already in place.
//! - **Identity**: account lookup and the irrevocable switch to a target
//!   user performed in a freshly forked child.
//!
//! Mounted state is owned by the kernel and may change underneath us, so
//! nothing here caches it. Every decision re-reads the live filesystem.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod filesystem;
pub mod identity;
pub mod orchestrator;
