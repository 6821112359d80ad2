//! Configuration for Bazelisk
//!
//! Values come from the process environment first and fall back to the
//! `.bazeliskrc` file in the workspace root. The configuration is read once
//! at startup and handed down by reference.

pub mod rc;

use crate::error::{BazeliskError, BazeliskResult};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Forces the version specifier, bypassing `.bazelversion`
pub const USE_BAZEL_VERSION: &str = "USE_BAZEL_VERSION";
/// Relocates all cache and download state
pub const BAZELISK_HOME: &str = "BAZELISK_HOME";
/// Flat download URL scheme: `<base>/<version>/<file>`
pub const BAZELISK_BASE_URL: &str = "BAZELISK_BASE_URL";
/// Download URL template with `%v`, `%o`, `%m`, `%e`, `%h` placeholders
pub const BAZELISK_FORMAT_URL: &str = "BAZELISK_FORMAT_URL";
/// Token for authenticated GitHub API requests
pub const BAZELISK_GITHUB_TOKEN: &str = "BAZELISK_GITHUB_TOKEN";
/// Run `bazel shutdown` before every migration trial
pub const BAZELISK_SHUTDOWN: &str = "BAZELISK_SHUTDOWN";
/// Run `bazel clean --expunge` before every migration trial
pub const BAZELISK_CLEAN: &str = "BAZELISK_CLEAN";
/// Disables delegation to `tools/bazel`
pub const BAZELISK_SKIP_WRAPPER: &str = "BAZELISK_SKIP_WRAPPER";
/// Expected SHA-256 of the downloaded binary
pub const BAZELISK_VERIFY_SHA256: &str = "BAZELISK_VERIFY_SHA256";
/// Path of the real Bazel binary, exported to the wrapper script
pub const BAZEL_REAL: &str = "BAZEL_REAL";

/// Memoized configuration lookup
///
/// The raw environment is kept as-is for the child. Lookups by name only see
/// variables whose name and value are valid UTF-8.
#[derive(Debug, Clone, Default)]
pub struct Config {
    vars: Vec<(OsString, OsString)>,
    env: HashMap<String, String>,
    file: HashMap<String, String>,
}

impl Config {
    /// Build a configuration from explicit environment and rc-file values
    pub fn new(env: HashMap<String, String>, file: HashMap<String, String>) -> Self {
        let vars = env
            .into_iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)));
        Self::from_vars(vars, file)
    }

    /// Build a configuration from raw environment variables
    pub fn from_vars<I>(vars: I, file: HashMap<String, String>) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let vars: Vec<(OsString, OsString)> = vars.into_iter().collect();
        let env = vars
            .iter()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v.to_str()?.to_string())))
            .collect();
        Self { vars, env, file }
    }

    /// Snapshot the process environment and read `.bazeliskrc` from the
    /// workspace root, if there is one
    pub fn load(workspace_root: Option<&Path>) -> BazeliskResult<Self> {
        let vars = std::env::vars_os();

        let file = match workspace_root {
            Some(root) => {
                let path = root.join(rc::RC_FILE_NAME);
                let values = rc::read_rc_file(&path)?;
                if !values.is_empty() {
                    debug!("Loaded {} values from {}", values.len(), path.display());
                }
                values
            }
            None => HashMap::new(),
        };

        Ok(Self::from_vars(vars, file))
    }

    /// Get a value from the environment, falling back to `.bazeliskrc`.
    ///
    /// Returns an empty string when the name is set nowhere.
    pub fn get(&self, name: &str) -> &str {
        match self.env.get(name) {
            Some(value) if !value.is_empty() => value,
            _ => self.file.get(name).map(String::as_str).unwrap_or(""),
        }
    }

    /// Whether `name` is set to a non-empty value
    pub fn is_set(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    /// Raw value from the process environment only
    pub fn env_os(&self, name: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_os_str())
    }

    /// Environment snapshot, sorted by name
    pub fn environment(&self) -> Vec<(OsString, OsString)> {
        let mut vars = self.vars.clone();
        vars.sort();
        vars
    }

    /// Directory holding all cache and download state
    pub fn bazelisk_home(&self) -> BazeliskResult<PathBuf> {
        if let Some(home) = self.env_os(BAZELISK_HOME).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }

        let configured = self.get(BAZELISK_HOME);
        if !configured.is_empty() {
            return Ok(PathBuf::from(configured));
        }

        dirs::cache_dir()
            .map(|dir| dir.join("bazelisk"))
            .ok_or_else(|| {
                BazeliskError::Internal("could not determine the user's cache directory".to_string())
            })
    }
}
