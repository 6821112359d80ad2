//! Bazelisk - a user-friendly launcher for Bazel
//!
//! Picks the Bazel version a workspace asks for, downloads it on first use
//! and runs it with the caller's arguments.

pub mod acquire;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod launch;
pub mod migrate;
pub mod platform;
pub mod repositories;
pub mod version;
pub mod workspace;

pub use error::{BazeliskError, BazeliskResult};
