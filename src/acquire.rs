//! Artifact acquisition
//!
//! Turns a resolved version into an executable on local disk. Downloads live
//! at a path derived from `(fork or URL, version, platform)`; a file at that
//! path is always complete, so its existence is the cache.
//!
//! ```text
//! <home>/
//! ├── downloads/<fork-or-url>/bazel-<version>-<os>-<arch>/bin/bazel
//! └── local/<sanitized-path>/bin/bazel      (link or copy of a local binary)
//! ```

use crate::config::{Config, BAZELISK_BASE_URL, BAZELISK_FORMAT_URL, BAZELISK_VERIFY_SHA256};
use crate::error::{BazeliskError, BazeliskResult};
use crate::http;
use crate::platform::Platform;
use crate::repositories::{dir_for_url, Destination, Repositories};
use crate::version::{ResolvedVersion, VersionKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Places Bazel binaries under the Bazelisk home directory
pub struct ArtifactAcquirer<'a> {
    home: PathBuf,
    repos: &'a Repositories,
    config: &'a Config,
    platform: Platform,
}

impl<'a> ArtifactAcquirer<'a> {
    pub fn new(
        home: impl Into<PathBuf>,
        repos: &'a Repositories,
        config: &'a Config,
        platform: Platform,
    ) -> Self {
        Self {
            home: home.into(),
            repos,
            config,
            platform,
        }
    }

    /// Return the local path of `version`, downloading it on first use
    pub async fn acquire(&self, version: &ResolvedVersion) -> BazeliskResult<PathBuf> {
        let base_url = self.config.get(BAZELISK_BASE_URL);
        let format_url = self.config.get(BAZELISK_FORMAT_URL);
        if !base_url.is_empty() && !format_url.is_empty() {
            return Err(BazeliskError::resolution(format!(
                "cannot set {} and {} at once",
                BAZELISK_BASE_URL, BAZELISK_FORMAT_URL
            )));
        }

        let fork_or_url = if !format_url.is_empty() {
            dir_for_url(format_url)
        } else if !base_url.is_empty() {
            dir_for_url(base_url)
        } else {
            version.fork.clone()
        };

        let sha256 = Some(self.config.get(BAZELISK_VERIFY_SHA256))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let dest = Destination {
            dir: self
                .home
                .join("downloads")
                .join(fork_or_url)
                .join(self.platform.artifact_dir_name(&version.label))
                .join("bin"),
            file: self.platform.executable_name(),
            source_file: self.platform.bazel_filename(&version.label),
            sha256,
        };

        let path = dest.path();
        if path.exists() {
            debug!("Using cached {}", path.display());
            return Ok(path);
        }

        if (!base_url.is_empty() || !format_url.is_empty()) && !self.repos.supports_base_url() {
            return Err(BazeliskError::Unsupported(format!(
                "{} and {} are not supported by this repository setup",
                BAZELISK_BASE_URL, BAZELISK_FORMAT_URL
            )));
        }

        if !format_url.is_empty() {
            let url = build_url_from_format(self.config, &self.platform, format_url, &version.label)?;
            return self.download_from(&url, &dest).await;
        }

        if !base_url.is_empty() {
            let url = if version.is_commit() {
                format!(
                    "{}/{}/{}/bazel",
                    base_url,
                    self.platform.commit_platform_name(),
                    version.label
                )
            } else {
                format!("{}/{}/{}", base_url, version.label, dest.source_file)
            };
            return self.download_from(&url, &dest).await;
        }

        let label = version.label.as_str();
        match version.kind {
            VersionKind::Release => self.repos.releases.download_release(label, &dest).await,
            VersionKind::Candidate => self.repos.candidates.download_candidate(label, &dest).await,
            VersionKind::ForkRelease => {
                self.repos
                    .fork
                    .download_fork_version(&version.fork, label, &dest)
                    .await
            }
            VersionKind::Commit => self.repos.commits.download_at_commit(label, &dest).await,
            VersionKind::Rolling => self.repos.rolling.download_rolling(label, &dest).await,
        }
    }

    /// Expose a local binary under the home directory.
    ///
    /// Creates a symlink to `source`, or a copy where symlinks are not
    /// available. Does nothing if the link already exists.
    pub async fn link_local(&self, source: &Path) -> BazeliskResult<PathBuf> {
        if !source.is_file() {
            return Err(BazeliskError::resolution(format!(
                "local Bazel binary {} does not exist",
                source.display()
            )));
        }

        let dir = self
            .home
            .join("local")
            .join(dir_for_url(&source.to_string_lossy()))
            .join("bin");
        let destination = dir.join(self.platform.executable_name());

        if tokio::fs::symlink_metadata(&destination).await.is_ok() {
            return Ok(destination);
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BazeliskError::io(format!("creating directory {}", dir.display()), e))?;

        if let Err(e) = symlink(source, &destination).await {
            debug!(
                "Could not symlink {} ({}), copying instead",
                source.display(),
                e
            );
            copy_executable(source, &destination).await?;
        }

        Ok(destination)
    }

    async fn download_from(&self, url: &str, dest: &Destination) -> BazeliskResult<PathBuf> {
        http::download_binary(url, &dest.dir, &dest.file, dest.sha256.as_deref()).await
    }
}

/// Expand the placeholders of a `BAZELISK_FORMAT_URL` template.
///
/// | Placeholder | Value |
/// |-------------|-------|
/// | `%e` | executable suffix |
/// | `%h` | `BAZELISK_VERIFY_SHA256` |
/// | `%m` | machine architecture |
/// | `%o` | operating system |
/// | `%v` | version label |
/// | `%%` | literal `%` |
pub fn build_url_from_format(
    config: &Config,
    platform: &Platform,
    format: &str,
    version: &str,
) -> BazeliskResult<String> {
    let invalid = |reason: String| {
        BazeliskError::resolution(format!(
            "invalid {} \"{}\": {}",
            BAZELISK_FORMAT_URL, format, reason
        ))
    };

    let mut url = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            url.push(c);
            continue;
        }

        match chars.next() {
            Some('e') => url.push_str(platform.executable_suffix()),
            Some('h') => url.push_str(config.get(BAZELISK_VERIFY_SHA256)),
            Some('m') => url.push_str(platform.machine_name()),
            Some('o') => url.push_str(platform.os_name()),
            Some('v') => url.push_str(version),
            Some('%') => url.push('%'),
            Some(other) => return Err(invalid(format!("unknown placeholder %{}", other))),
            None => return Err(invalid("trailing %".to_string())),
        }
    }

    Ok(url)
}

#[cfg(unix)]
async fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, destination).await
}

#[cfg(windows)]
async fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(source, destination).await
}

async fn copy_executable(source: &Path, destination: &Path) -> BazeliskResult<()> {
    tokio::fs::copy(source, destination).await.map_err(|e| {
        BazeliskError::io(
            format!("copying {} to {}", source.display(), destination.display()),
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(destination, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| {
                BazeliskError::io(format!("making {} executable", destination.display()), e)
            })?;
    }

    Ok(())
}
