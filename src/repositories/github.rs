//! GitHub releases repository
//!
//! Lists the releases of `github.com/<fork>/bazel` and downloads their
//! assets. Used for forks and as the primary source of upstream releases.

use crate::cache::MetadataCache;
use crate::error::{BazeliskError, BazeliskResult};
use crate::http;
use crate::repositories::{dir_for_url, Destination, ForkRepo};
use crate::version::order;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

/// A release as returned by the GitHub API
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
}

/// Repository backed by GitHub releases
pub struct GitHubRepo {
    cache: MetadataCache,
}

impl GitHubRepo {
    pub fn new(cache: MetadataCache) -> Self {
        Self { cache }
    }
}

/// Tags of all non-prerelease releases, ascending
fn release_tags(releases_json: &[u8]) -> BazeliskResult<Vec<String>> {
    let releases: Vec<GitHubRelease> = serde_json::from_slice(releases_json)
        .map_err(|e| BazeliskError::invalid_json("JSON into list of releases", e))?;

    let tags = releases
        .into_iter()
        .filter(|r| !r.prerelease)
        .map(|r| r.tag_name)
        .collect();

    Ok(order::sort_ascending(tags))
}

#[async_trait]
impl ForkRepo for GitHubRepo {
    async fn fork_versions(&self, fork: &str) -> BazeliskResult<Vec<String>> {
        let url = format!("https://api.github.com/repos/{}/bazel/releases", fork);
        let key = format!("{}-releases.json", dir_for_url(fork));
        let description = format!("list of Bazel releases from github.com/{}", fork);

        let content = self
            .cache
            .get_or_fetch(&key, &url, &description)
            .await
            .map_err(|e| e.context(format!("could not get releases from github.com/{}/bazel", fork)))?;

        release_tags(&content)
    }

    async fn download_fork_version(
        &self,
        fork: &str,
        version: &str,
        dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        let url = format!(
            "https://github.com/{}/bazel/releases/download/{}/{}",
            fork, version, dest.source_file
        );
        http::download_binary(&url, &dest.dir, &dest.file, dest.sha256.as_deref()).await
    }
}
