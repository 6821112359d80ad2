//! Bazel repositories
//!
//! Each version family lives in its own kind of repository:
//! - releases: upstream LTS releases
//! - candidates: release candidates of the newest release
//! - forks: releases published by a GitHub fork
//! - commits: CI builds at a commit, plus the last green commit
//! - rolling: rolling pre-releases
//!
//! `Repositories` holds one handle per family. Families without a real
//! backend get an `Unsupported` stand-in that fails with a descriptive
//! error, so callers never check for availability.

mod gcs;
mod github;
mod upstream;

pub use gcs::GcsRepo;
pub use github::GitHubRepo;
pub use upstream::UpstreamReleases;

use crate::error::{BazeliskError, BazeliskResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a downloaded binary should end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Directory the binary is placed in
    pub dir: PathBuf,

    /// Filename of the binary inside `dir`
    pub file: String,

    /// Platform-specific published filename, e.g. `bazel-7.0.0-linux-x86_64`
    pub source_file: String,

    /// Expected SHA-256 of the binary, if verification is requested
    pub sha256: Option<String>,
}

impl Destination {
    /// Final path of the binary
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

/// Restricts release listings to a track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFilter {
    /// Label prefix such as `6.` or `6.2.`
    pub track: Option<String>,
}

impl ReleaseFilter {
    /// Whether `version` passes the filter
    pub fn matches(&self, version: &str) -> bool {
        match &self.track {
            Some(prefix) => version.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Repository of full releases
#[async_trait]
pub trait ReleaseRepo: Send + Sync {
    /// List available releases. Backends may apply `filter` server-side.
    async fn release_versions(&self, filter: &ReleaseFilter) -> BazeliskResult<Vec<String>>;

    /// Download a release
    async fn download_release(&self, version: &str, dest: &Destination) -> BazeliskResult<PathBuf>;
}

/// Repository of release candidates
#[async_trait]
pub trait CandidateRepo: Send + Sync {
    /// List available candidates as `<base>rc<N>` labels
    async fn candidate_versions(&self) -> BazeliskResult<Vec<String>>;

    /// Download a release candidate
    async fn download_candidate(&self, version: &str, dest: &Destination)
        -> BazeliskResult<PathBuf>;
}

/// Repository of releases published by forks
#[async_trait]
pub trait ForkRepo: Send + Sync {
    /// List the releases of `fork`
    async fn fork_versions(&self, fork: &str) -> BazeliskResult<Vec<String>>;

    /// Download a release of `fork`
    async fn download_fork_version(
        &self,
        fork: &str,
        version: &str,
        dest: &Destination,
    ) -> BazeliskResult<PathBuf>;
}

/// Repository of binaries built at individual commits
#[async_trait]
pub trait CommitRepo: Send + Sync {
    /// Most recent commit that passed CI. With `downstream` set, the
    /// pipeline also covers downstream projects.
    async fn last_green_commit(&self, downstream: bool) -> BazeliskResult<String>;

    /// Download the binary built at `commit`
    async fn download_at_commit(&self, commit: &str, dest: &Destination)
        -> BazeliskResult<PathBuf>;
}

/// Repository of rolling releases
#[async_trait]
pub trait RollingRepo: Send + Sync {
    /// List available rolling releases
    async fn rolling_versions(&self) -> BazeliskResult<Vec<String>>;

    /// Download a rolling release
    async fn download_rolling(&self, version: &str, dest: &Destination) -> BazeliskResult<PathBuf>;
}

/// Stand-in for a family without a backend. Every call fails with `reason`.
#[derive(Debug, Clone)]
pub struct Unsupported {
    reason: &'static str,
}

impl Unsupported {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }

    fn fail<T>(&self) -> BazeliskResult<T> {
        Err(BazeliskError::Unsupported(self.reason.to_string()))
    }
}

#[async_trait]
impl ReleaseRepo for Unsupported {
    async fn release_versions(&self, _filter: &ReleaseFilter) -> BazeliskResult<Vec<String>> {
        self.fail()
    }

    async fn download_release(&self, _version: &str, _dest: &Destination) -> BazeliskResult<PathBuf> {
        self.fail()
    }
}

#[async_trait]
impl CandidateRepo for Unsupported {
    async fn candidate_versions(&self) -> BazeliskResult<Vec<String>> {
        self.fail()
    }

    async fn download_candidate(
        &self,
        _version: &str,
        _dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        self.fail()
    }
}

#[async_trait]
impl ForkRepo for Unsupported {
    async fn fork_versions(&self, _fork: &str) -> BazeliskResult<Vec<String>> {
        self.fail()
    }

    async fn download_fork_version(
        &self,
        _fork: &str,
        _version: &str,
        _dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        self.fail()
    }
}

#[async_trait]
impl CommitRepo for Unsupported {
    async fn last_green_commit(&self, _downstream: bool) -> BazeliskResult<String> {
        self.fail()
    }

    async fn download_at_commit(
        &self,
        _commit: &str,
        _dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        self.fail()
    }
}

#[async_trait]
impl RollingRepo for Unsupported {
    async fn rolling_versions(&self) -> BazeliskResult<Vec<String>> {
        self.fail()
    }

    async fn download_rolling(&self, _version: &str, _dest: &Destination) -> BazeliskResult<PathBuf> {
        self.fail()
    }
}

/// One handle per version family
#[derive(Clone)]
pub struct Repositories {
    pub releases: Arc<dyn ReleaseRepo>,
    pub candidates: Arc<dyn CandidateRepo>,
    pub fork: Arc<dyn ForkRepo>,
    pub commits: Arc<dyn CommitRepo>,
    pub rolling: Arc<dyn RollingRepo>,
    supports_base_url: bool,
}

impl Repositories {
    /// Start building a set with every family unsupported
    pub fn builder() -> RepositoriesBuilder {
        RepositoriesBuilder::default()
    }

    /// The default upstream setup: GitHub for releases and forks with a
    /// GCS fallback, GCS for everything else
    pub fn upstream(gcs: Arc<GcsRepo>, github: Arc<GitHubRepo>) -> Self {
        let releases = Arc::new(UpstreamReleases::new(github.clone(), gcs.clone()));
        Self::builder()
            .releases(releases)
            .candidates(gcs.clone())
            .fork(github)
            .commits(gcs.clone())
            .rolling(gcs)
            .supports_base_url(true)
            .build()
    }

    /// Whether `BAZELISK_BASE_URL` / `BAZELISK_FORMAT_URL` downloads are allowed
    pub fn supports_base_url(&self) -> bool {
        self.supports_base_url
    }
}

/// Builder for `Repositories`; unset families become `Unsupported`
#[derive(Default)]
pub struct RepositoriesBuilder {
    releases: Option<Arc<dyn ReleaseRepo>>,
    candidates: Option<Arc<dyn CandidateRepo>>,
    fork: Option<Arc<dyn ForkRepo>>,
    commits: Option<Arc<dyn CommitRepo>>,
    rolling: Option<Arc<dyn RollingRepo>>,
    supports_base_url: bool,
}

impl RepositoriesBuilder {
    pub fn releases(mut self, repo: Arc<dyn ReleaseRepo>) -> Self {
        self.releases = Some(repo);
        self
    }

    pub fn candidates(mut self, repo: Arc<dyn CandidateRepo>) -> Self {
        self.candidates = Some(repo);
        self
    }

    pub fn fork(mut self, repo: Arc<dyn ForkRepo>) -> Self {
        self.fork = Some(repo);
        self
    }

    pub fn commits(mut self, repo: Arc<dyn CommitRepo>) -> Self {
        self.commits = Some(repo);
        self
    }

    pub fn rolling(mut self, repo: Arc<dyn RollingRepo>) -> Self {
        self.rolling = Some(repo);
        self
    }

    pub fn supports_base_url(mut self, supported: bool) -> Self {
        self.supports_base_url = supported;
        self
    }

    pub fn build(self) -> Repositories {
        Repositories {
            releases: self
                .releases
                .unwrap_or_else(|| Arc::new(Unsupported::new("Bazel releases are not supported"))),
            candidates: self.candidates.unwrap_or_else(|| {
                Arc::new(Unsupported::new("Bazel release candidates are not supported"))
            }),
            fork: self.fork.unwrap_or_else(|| {
                Arc::new(Unsupported::new("forked versions of Bazel are not supported"))
            }),
            commits: self.commits.unwrap_or_else(|| {
                Arc::new(Unsupported::new(
                    "Bazel versions built at commits are not supported",
                ))
            }),
            rolling: self.rolling.unwrap_or_else(|| {
                Arc::new(Unsupported::new("Bazel rolling releases are not supported"))
            }),
            supports_base_url: self.supports_base_url,
        }
    }
}

/// Directory name component for a label, a path or a URL: every
/// non-alphanumeric character becomes `-`
pub fn dir_for_url(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
