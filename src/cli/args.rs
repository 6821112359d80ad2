//! CLI argument definitions using clap derive
//!
//! Bazelisk owns no flags of its own: everything is handed to Bazel, except
//! a few reserved first arguments. Arguments stay `OsString`s so Bazel gets
//! exactly the bytes it was called with.

use clap::Parser;
use std::ffi::OsString;
use std::iter;

/// Reserved first argument: print the child environment and exit
pub const PRINT_ENV: &str = "--print_env";
/// Reserved first argument: enable all incompatible flags
pub const STRICT: &str = "--strict";
/// Reserved first argument: bisect incompatible flags
pub const MIGRATE: &str = "--migrate";

/// Bazelisk - a user-friendly launcher for Bazel
#[derive(Parser, Debug)]
#[command(name = "bazelisk")]
#[command(about, long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Bazel command and arguments
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_parser = clap::value_parser!(OsString)
    )]
    pub args: Vec<OsString>,
}

/// What the launcher does with the arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherCommand {
    /// Start Bazel with the arguments as given
    Bazel,
    /// Print the environment Bazel would get
    PrintEnv,
    /// Start Bazel with all incompatible flags enabled
    Strict,
    /// Find out which incompatible flags break the command
    Migrate,
}

impl Cli {
    /// Parse the process arguments
    pub fn parse_passthrough() -> Self {
        Self::parse_passthrough_from(std::env::args_os())
    }

    /// Parse `argv`, program name first, keeping every later argument
    /// verbatim.
    ///
    /// clap would swallow a leading `--` as its own separator, so one is
    /// inserted ahead of the user's arguments.
    pub fn parse_passthrough_from<I, T>(argv: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().unwrap_or_else(|| OsString::from("bazelisk"));
        Self::parse_from(
            iter::once(program)
                .chain(iter::once(OsString::from("--")))
                .chain(argv),
        )
    }

    /// Split off a reserved first argument
    pub fn launcher_command(&self) -> (LauncherCommand, &[OsString]) {
        let command = match self.args.first().and_then(|arg| arg.to_str()) {
            Some(PRINT_ENV) => LauncherCommand::PrintEnv,
            Some(STRICT) => LauncherCommand::Strict,
            Some(MIGRATE) => LauncherCommand::Migrate,
            _ => return (LauncherCommand::Bazel, &self.args),
        };
        (command, &self.args[1..])
    }
}
