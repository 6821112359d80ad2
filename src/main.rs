//! Bazelisk - a user-friendly launcher for Bazel
//!
//! CLI entry point: sets up logging and hands the arguments to the launcher.

use bazelisk::cli::Cli;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_passthrough();

    // stdout belongs to Bazel, so logs go to stderr
    let filter = EnvFilter::try_from_env("BAZELISK_LOG")
        .unwrap_or_else(|_| EnvFilter::new("bazelisk=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match bazelisk::cli::execute(cli).await {
        Ok(code) => ExitCode::from(exit_status_byte(code)),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// Exit statuses are a single byte on every platform we ship for
fn exit_status_byte(code: i32) -> u8 {
    (code & 0xff) as u8
}
