//! Command-line interface

pub mod args;
mod run;

pub use args::{Cli, LauncherCommand};
pub use run::execute;
