//! Incompatible flag migration: `--strict` and `--migrate`

mod controller;
mod flags;

pub use controller::{
    insert_args, MigrationController, MigrationOutcome, MigrationReport, MigrationTrial,
};
pub use flags::{FlagPatterns, FlagProvider, FlagSet, GitHubIssueFlags, MigrationFlag};
