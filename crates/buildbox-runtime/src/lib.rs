//! Process launching for build-box.
//!
//! A launch forks exactly one child, switches it to the target identity
//! (after changing its root, if requested) and only then loads the program
//! image. Standard output is either captured into an owned buffer or left
//! attached to the terminal.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod launcher;
pub mod process;
pub mod state;
pub mod targets;
