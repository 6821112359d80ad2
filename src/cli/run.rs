//! Top-level invocation: find Bazel, then run, inspect or migrate it

use crate::acquire::ArtifactAcquirer;
use crate::cache::MetadataCache;
use crate::cli::args::{Cli, LauncherCommand};
use crate::config::{Config, BAZELISK_CLEAN, BAZELISK_GITHUB_TOKEN, BAZELISK_SHUTDOWN};
use crate::error::{BazeliskError, BazeliskResult};
use crate::launch::{CommandRunner, LaunchPlanner, ProcessRunner};
use crate::migrate::{insert_args, FlagProvider, FlagSet, GitHubIssueFlags, MigrationController};
use crate::platform::Platform;
use crate::repositories::{GcsRepo, GitHubRepo, Repositories};
use crate::version::{VersionResolver, VersionSpecifier};
use crate::workspace;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Version reported when Bazel is a local binary
const UNKNOWN_VERSION: &str = "unknown";

/// A Bazel binary on local disk
#[derive(Debug, Clone)]
struct LocatedBazel {
    path: PathBuf,

    /// Resolved version label, or `unknown` for local binaries
    version: String,
}

/// Execute one invocation and return the process exit code
pub async fn execute(cli: Cli) -> BazeliskResult<i32> {
    let cwd = std::env::current_dir()
        .map_err(|e| BazeliskError::io("getting current directory", e))?;
    let workspace_root = workspace::find_workspace_root(&cwd);
    if let Some(ref root) = workspace_root {
        debug!("Workspace root: {}", root.display());
    }

    let config = Config::load(workspace_root.as_deref())?;
    let home = config.bazelisk_home()?;
    tokio::fs::create_dir_all(&home)
        .await
        .map_err(|e| BazeliskError::io(format!("creating directory {}", home.display()), e))?;

    let platform = Platform::detect()?;
    let cache = MetadataCache::new(&home)
        .with_github_token(Some(config.get(BAZELISK_GITHUB_TOKEN).to_string()));
    let repos = Repositories::upstream(
        Arc::new(GcsRepo::new(cache.clone(), platform)),
        Arc::new(GitHubRepo::new(cache.clone())),
    );

    let specifier = workspace::version_specifier(&config, workspace_root.as_deref())?;
    let bazel = locate_bazel(&specifier, &config, &home, &repos, platform).await?;
    debug!("Using Bazel {} at {}", bazel.version, bazel.path.display());

    let plan = LaunchPlanner::new(&config, workspace_root).plan(&bazel.path)?;
    let (command, rest) = cli.launcher_command();

    let args = match command {
        LauncherCommand::PrintEnv => {
            let env = plan.environment(&config.environment());
            print_environment(&mut std::io::stdout().lock(), &env)?;
            return Ok(0);
        }
        LauncherCommand::Strict => {
            let flags = incompatible_flags(cache, &bazel.version).await?;
            let names: Vec<String> = flags.into_keys().collect();
            insert_args(rest, &names)
        }
        LauncherCommand::Migrate => {
            let flags = incompatible_flags(cache, &bazel.version).await?;
            let runner = ProcessRunner::new(plan);
            let report = MigrationController::new(&runner)
                .with_shutdown(config.is_set(BAZELISK_SHUTDOWN))
                .with_clean(config.is_set(BAZELISK_CLEAN))
                .run(rest, &flags, &mut std::io::stdout())
                .await?;
            return Ok(report.exit_code);
        }
        LauncherCommand::Bazel => rest.to_vec(),
    };

    if let Some(banner) = version_banner(&args) {
        println!("{}", banner);
    }

    ProcessRunner::new(plan).run(&args).await
}

/// Resolve and fetch the Bazel binary named by `specifier`
async fn locate_bazel(
    specifier: &str,
    config: &Config,
    home: &Path,
    repos: &Repositories,
    platform: Platform,
) -> BazeliskResult<LocatedBazel> {
    let acquirer = ArtifactAcquirer::new(home, repos, config, platform);

    let local = workspace::expand_home(specifier);
    if local.is_absolute() {
        let path = acquirer
            .link_local(&local)
            .await
            .map_err(|e| e.context("could not link local Bazel"))?;
        return Ok(LocatedBazel {
            path,
            version: UNKNOWN_VERSION.to_string(),
        });
    }

    let spec = VersionSpecifier::parse(specifier)?;
    let resolved = VersionResolver::new(repos)
        .resolve(&spec)
        .await
        .map_err(|e| {
            e.context(format!(
                "could not resolve the version '{}' to an actual version number",
                spec.value
            ))
        })?;

    let path = acquirer
        .acquire(&resolved)
        .await
        .map_err(|e| e.context("could not download Bazel"))?;

    Ok(LocatedBazel {
        path,
        version: resolved.label,
    })
}

async fn incompatible_flags(cache: MetadataCache, version: &str) -> BazeliskResult<FlagSet> {
    GitHubIssueFlags::new(cache)?
        .incompatible_flags(version)
        .await
        .map_err(|e| e.context("could not get the list of incompatible flags"))
}

/// Write `KEY=VALUE` lines with the raw bytes of each variable
fn print_environment(out: &mut dyn Write, env: &[(OsString, OsString)]) -> BazeliskResult<()> {
    for (name, value) in env {
        write_variable(out, name, value)
            .map_err(|e| BazeliskError::io("printing environment", e))?;
    }
    Ok(())
}

fn write_variable(out: &mut dyn Write, name: &OsStr, value: &OsStr) -> std::io::Result<()> {
    out.write_all(name.as_encoded_bytes())?;
    out.write_all(b"=")?;
    out.write_all(value.as_encoded_bytes())?;
    out.write_all(b"\n")
}

/// Bazelisk's own version line, printed ahead of `bazel version`
fn version_banner(args: &[OsString]) -> Option<String> {
    if args.first().and_then(|arg| arg.to_str()) != Some("version") {
        return None;
    }

    let version = env!("CARGO_PKG_VERSION");
    if args.iter().any(|arg| arg == "--gnu_format") {
        Some(format!("Bazelisk {}", version))
    } else {
        Some(format!("Bazelisk version: {}", version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn banner_only_for_version_command() {
        assert_eq!(version_banner(&strings(&["build", "version"])), None);
        assert_eq!(
            version_banner(&strings(&["version"])),
            Some(format!("Bazelisk version: {}", env!("CARGO_PKG_VERSION")))
        );
        assert_eq!(
            version_banner(&strings(&["version", "--gnu_format"])),
            Some(format!("Bazelisk {}", env!("CARGO_PKG_VERSION")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn environment_is_printed_byte_for_byte() {
        use std::os::unix::ffi::OsStrExt;

        let env = vec![
            (OsString::from("A"), OsString::from("1")),
            (OsString::from("LATIN1_VAR"), OsStr::from_bytes(b"caf\xe9").to_os_string()),
        ];
        let mut out = Vec::new();
        print_environment(&mut out, &env).unwrap();

        assert_eq!(out, b"A=1\nLATIN1_VAR=caf\xe9\n");
    }

    #[tokio::test]
    async fn local_binary_has_unknown_version() {
        let temp = tempfile::TempDir::new().unwrap();
        let binary = temp.path().join("bazel-dev");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let repos = Repositories::builder().build();
        let config = Config::default();
        let platform = Platform::detect().unwrap();
        let located = locate_bazel(
            &binary.to_string_lossy(),
            &config,
            &temp.path().join("home"),
            &repos,
            platform,
        )
        .await
        .unwrap();

        assert_eq!(located.version, UNKNOWN_VERSION);
        assert!(located.path.starts_with(temp.path().join("home").join("local")));
    }
}
