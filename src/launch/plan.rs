//! Launch planning
//!
//! Decides which program to start and with what environment. A workspace can
//! ship an executable `tools/bazel` wrapper; when present it is started
//! instead of Bazel and finds the real binary through `BAZEL_REAL`.

use crate::config::{Config, BAZELISK_SKIP_WRAPPER, BAZEL_REAL};
use crate::error::{BazeliskError, BazeliskResult};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Wrapper script location relative to the workspace root
pub const WRAPPER_PATH: &str = "tools/bazel";

/// Path of the running launcher, exported to the child
pub const BAZELISK_SELF: &str = "BAZELISK";

/// What to start and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Program to spawn: the wrapper or the real binary
    pub program: PathBuf,

    /// The resolved Bazel binary
    pub real_binary: PathBuf,

    /// Variables set on top of the inherited environment
    pub env: BTreeMap<String, OsString>,
}

impl LaunchPlan {
    /// Whether the plan starts the workspace wrapper
    pub fn is_delegated(&self) -> bool {
        self.program != self.real_binary
    }

    /// Full child environment: `base` with the overlay applied, sorted
    pub fn environment(&self, base: &[(OsString, OsString)]) -> Vec<(OsString, OsString)> {
        let mut merged: BTreeMap<OsString, OsString> = base.iter().cloned().collect();
        merged.extend(
            self.env
                .iter()
                .map(|(name, value)| (OsString::from(name), value.clone())),
        );
        merged.into_iter().collect()
    }
}

/// Builds launch plans for one invocation
pub struct LaunchPlanner<'a> {
    config: &'a Config,
    workspace_root: Option<PathBuf>,
}

impl<'a> LaunchPlanner<'a> {
    pub fn new(config: &'a Config, workspace_root: Option<PathBuf>) -> Self {
        Self {
            config,
            workspace_root,
        }
    }

    /// Plan the launch of `real_binary`
    pub fn plan(&self, real_binary: &Path) -> BazeliskResult<LaunchPlan> {
        let program = self
            .wrapper()
            .unwrap_or_else(|| real_binary.to_path_buf());

        let mut env = BTreeMap::new();
        env.insert(BAZELISK_SKIP_WRAPPER.to_string(), OsString::from("true"));
        if program != real_binary {
            debug!("Delegating to wrapper {}", program.display());
            env.insert(BAZEL_REAL.to_string(), real_binary.as_os_str().to_os_string());
        }
        if let Ok(current) = std::env::current_exe() {
            env.insert(BAZELISK_SELF.to_string(), current.into_os_string());
        }
        if let Some(dir) = real_binary.parent() {
            env.insert("PATH".to_string(), self.prepend_to_path(dir)?);
        }

        Ok(LaunchPlan {
            program,
            real_binary: real_binary.to_path_buf(),
            env,
        })
    }

    /// The workspace wrapper, unless wrappers are disabled or this process
    /// is already running under one
    fn wrapper(&self) -> Option<PathBuf> {
        if self.config.is_set(BAZELISK_SKIP_WRAPPER) {
            debug!("{} is set, not looking for a wrapper", BAZELISK_SKIP_WRAPPER);
            return None;
        }

        let wrapper = self.workspace_root.as_ref()?.join(WRAPPER_PATH);
        is_executable_file(&wrapper).then_some(wrapper)
    }

    fn prepend_to_path(&self, dir: &Path) -> BazeliskResult<OsString> {
        let current = self.config.env_os("PATH").unwrap_or_default();
        let entries = std::iter::once(dir.to_path_buf())
            .chain(std::env::split_paths(current).filter(|p| !p.as_os_str().is_empty()));

        std::env::join_paths(entries).map_err(|e| {
            BazeliskError::Internal(format!("could not add {} to PATH: {}", dir.display(), e))
        })
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| !m.is_dir() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
