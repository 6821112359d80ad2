//! Bazel versions: specifier parsing, ordering and resolution

pub mod order;
mod resolve;
mod specifier;

pub use resolve::{highest_candidate, select_latest, ResolvedVersion, VersionResolver};
pub use specifier::{split_candidate, Selector, VersionKind, VersionSpecifier, UPSTREAM};
