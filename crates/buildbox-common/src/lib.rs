//! # buildbox-common
//!
//! Shared types, error definitions, configuration model, and constants
//! used across the build-box workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and never touches the kernel.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
