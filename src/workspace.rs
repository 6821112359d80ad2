//! Workspace discovery
//!
//! Finds the enclosing Bazel workspace and the version it asks for.

use crate::config::{Config, USE_BAZEL_VERSION};
use crate::error::{BazeliskError, BazeliskResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files whose presence marks a workspace root
pub const WORKSPACE_MARKERS: &[&str] = &["WORKSPACE", "WORKSPACE.bazel", "MODULE.bazel"];

/// Name of the file pinning the Bazel version
pub const VERSION_FILE_NAME: &str = ".bazelversion";

/// Specifier used when nothing else is configured
pub const DEFAULT_SPECIFIER: &str = "latest";

/// Walk upwards from `start` until a directory containing a workspace marker
/// is found. Returns `None` once the filesystem root has been checked.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if WORKSPACE_MARKERS
            .iter()
            .any(|marker| dir.join(marker).is_file())
        {
            return Some(dir.to_path_buf());
        }

        match dir.parent() {
            Some(parent) if parent != dir => dir = parent,
            _ => return None,
        }
    }
}

/// Read the first line of `.bazelversion` in the workspace root
pub fn read_version_file(workspace_root: &Path) -> BazeliskResult<Option<String>> {
    let path = workspace_root.join(VERSION_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| BazeliskError::io(format!("reading {}", path.display()), e))?;

    let version = content.lines().next().unwrap_or("").trim().to_string();
    if version.is_empty() {
        Ok(None)
    } else {
        Ok(Some(version))
    }
}

/// Determine the raw version specifier for this invocation.
///
/// Order: `USE_BAZEL_VERSION`, then `.bazelversion`, then `latest`.
pub fn version_specifier(
    config: &Config,
    workspace_root: Option<&Path>,
) -> BazeliskResult<String> {
    let forced = config.get(USE_BAZEL_VERSION);
    if !forced.is_empty() {
        debug!("Using version from {}: {}", USE_BAZEL_VERSION, forced);
        return Ok(forced.to_string());
    }

    if let Some(root) = workspace_root {
        if let Some(version) = read_version_file(root)? {
            debug!("Using version from {}: {}", VERSION_FILE_NAME, version);
            return Ok(version);
        }
    }

    Ok(DEFAULT_SPECIFIER.to_string())
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(specifier: &str) -> PathBuf {
    if let Some(rest) = specifier.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if specifier == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(specifier)
}
