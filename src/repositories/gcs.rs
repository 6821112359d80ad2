//! Google Cloud Storage repository
//!
//! The `bazel` bucket has one top-level directory per version. Each holds a
//! `release/` directory once the version ships, `rcN/` directories for its
//! candidates and a `rolling/` directory for rolling releases.

use crate::cache::MetadataCache;
use crate::error::{BazeliskError, BazeliskResult};
use crate::http;
use crate::platform::Platform;
use crate::repositories::{
    dir_for_url, CandidateRepo, CommitRepo, Destination, ReleaseFilter, ReleaseRepo, RollingRepo,
};
use crate::version::{order, split_candidate};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

const BUCKET_LISTING_URL: &str = "https://www.googleapis.com/storage/v1/b/bazel/o?delimiter=/";
const RELEASES_BASE_URL: &str = "https://releases.bazel.build";
const COMMIT_ARTIFACTS_BASE_URL: &str = "https://storage.googleapis.com/bazel-builds/artifacts";
const LAST_GREEN_BASE_URL: &str =
    "https://storage.googleapis.com/bazel-untrusted-builds/last_green_commit/";
const LAST_GREEN_PIPELINE: &str = "github.com/bazelbuild/bazel.git/bazel-bazel";
const LAST_DOWNSTREAM_GREEN_PIPELINE: &str = "downstream_pipeline";

/// One page of a delimiter listing
#[derive(Debug, Default, Deserialize)]
struct BucketListing {
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl BucketListing {
    /// Last path segment of each prefix, e.g. `6.0.0/rc1/` -> `rc1`
    fn directory_names(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .filter_map(|p| p.trim_end_matches('/').rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Repository backed by the `bazel` GCS bucket
pub struct GcsRepo {
    cache: MetadataCache,
    platform: Platform,
}

impl GcsRepo {
    pub fn new(cache: MetadataCache, platform: Platform) -> Self {
        Self { cache, platform }
    }

    async fn list(&self, prefix: &str) -> BazeliskResult<BucketListing> {
        let url = if prefix.is_empty() {
            BUCKET_LISTING_URL.to_string()
        } else {
            format!("{}&prefix={}", BUCKET_LISTING_URL, prefix)
        };
        let key = format!("gcs-{}.json", dir_for_url(prefix));

        let content = self
            .cache
            .get_or_fetch(&key, &url, &format!("GCS objects at {}", url))
            .await?;

        serde_json::from_slice(&content)
            .map_err(|e| BazeliskError::invalid_json("GCS index JSON", e))
    }

    /// All top-level version directories in ascending order
    async fn version_directories(&self, prefix: &str) -> BazeliskResult<Vec<String>> {
        let listing = self.list(prefix).await?;
        Ok(order::sort_ascending(listing.directory_names()))
    }

    async fn newest_version_directory(&self) -> BazeliskResult<String> {
        self.version_directories("")
            .await?
            .pop()
            .ok_or_else(|| BazeliskError::resolution("could not find any Bazel versions"))
    }

    async fn download(&self, url: String, dest: &Destination) -> BazeliskResult<PathBuf> {
        http::download_binary(&url, &dest.dir, &dest.file, dest.sha256.as_deref()).await
    }
}

#[async_trait]
impl ReleaseRepo for GcsRepo {
    async fn release_versions(&self, filter: &ReleaseFilter) -> BazeliskResult<Vec<String>> {
        let prefix = filter.track.as_deref().unwrap_or("");
        let mut versions: Vec<String> = self
            .version_directories(prefix)
            .await
            .map_err(|e| e.context("could not list Bazel versions in GCS bucket"))?
            .into_iter()
            .filter(|v| order::is_release_label(v) && filter.matches(v))
            .collect();

        // The newest directory exists before the release itself is published
        if let Some(latest) = versions.last() {
            let listing = self.list(&format!("{}/release/", latest)).await?;
            if listing.items.is_empty() {
                versions.pop();
            }
        }

        Ok(versions)
    }

    async fn download_release(&self, version: &str, dest: &Destination) -> BazeliskResult<PathBuf> {
        let url = format!(
            "{}/{}/release/{}",
            RELEASES_BASE_URL, version, dest.source_file
        );
        self.download(url, dest).await
    }
}

#[async_trait]
impl CandidateRepo for GcsRepo {
    async fn candidate_versions(&self) -> BazeliskResult<Vec<String>> {
        let latest = self.newest_version_directory().await?;
        let listing = self
            .list(&format!("{}/", latest))
            .await
            .map_err(|e| e.context("could not list release candidates for latest release"))?;

        Ok(listing
            .directory_names()
            .into_iter()
            .filter(|name| name.starts_with("rc"))
            .map(|rc| format!("{}{}", latest, rc))
            .collect())
    }

    async fn download_candidate(
        &self,
        version: &str,
        dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        let (base, ordinal) = split_candidate(version)?.ok_or_else(|| {
            BazeliskError::resolution(format!("'{}' does not refer to a release candidate", version))
        })?;
        let url = format!(
            "{}/{}/rc{}/{}",
            RELEASES_BASE_URL, base, ordinal, dest.source_file
        );
        self.download(url, dest).await
    }
}

#[async_trait]
impl CommitRepo for GcsRepo {
    async fn last_green_commit(&self, downstream: bool) -> BazeliskResult<String> {
        let (pipeline, key) = if downstream {
            (LAST_DOWNSTREAM_GREEN_PIPELINE, "last_downstream_green")
        } else {
            (LAST_GREEN_PIPELINE, "last_green")
        };
        let url = format!("{}{}", LAST_GREEN_BASE_URL, pipeline);

        let content = self
            .cache
            .get_or_fetch(key, &url, "last green commit")
            .await?;
        let commit = String::from_utf8_lossy(&content).trim().to_string();
        if commit.is_empty() {
            return Err(BazeliskError::resolution(format!(
                "{} did not name a commit",
                url
            )));
        }
        Ok(commit)
    }

    async fn download_at_commit(
        &self,
        commit: &str,
        dest: &Destination,
    ) -> BazeliskResult<PathBuf> {
        info!("Using unreleased version at commit {}", commit);
        let url = format!(
            "{}/{}/{}/bazel",
            COMMIT_ARTIFACTS_BASE_URL,
            self.platform.commit_platform_name(),
            commit
        );
        self.download(url, dest).await
    }
}

#[async_trait]
impl RollingRepo for GcsRepo {
    async fn rolling_versions(&self) -> BazeliskResult<Vec<String>> {
        let newest = self.newest_version_directory().await?;
        let listing = self.list(&format!("{}/rolling/", newest)).await?;
        Ok(order::sort_ascending(listing.directory_names()))
    }

    async fn download_rolling(&self, version: &str, dest: &Destination) -> BazeliskResult<PathBuf> {
        let base = version.split("-pre").next().unwrap_or(version);
        let url = format!(
            "{}/{}/rolling/{}/{}",
            RELEASES_BASE_URL, base, version, dest.source_file
        );
        self.download(url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_directory_names() {
        let listing: BucketListing = serde_json::from_str(
            r#"{"kind": "storage#objects", "prefixes": ["6.0.0/rc1/", "6.0.0/rc2/", "6.0.0/release/"]}"#,
        )
        .unwrap();

        assert_eq!(listing.directory_names(), vec!["rc1", "rc2", "release"]);
        assert!(listing.items.is_empty());
    }

    #[tokio::test]
    async fn release_listing_served_from_cache() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = MetadataCache::new(temp.path());
        cache
            .store(
                "gcs-.json",
                br#"{"prefixes": ["5.4.0/", "6.0.0/", "7.0.0/", "junk/"]}"#,
            )
            .await
            .unwrap();
        cache
            .store("gcs-7-0-0-release-.json", br#"{"items": [{"name": "7.0.0/release/bazel"}]}"#)
            .await
            .unwrap();

        let platform = Platform::detect().unwrap();
        let repo = GcsRepo::new(cache, platform);
        let versions = repo
            .release_versions(&ReleaseFilter::default())
            .await
            .unwrap();

        assert_eq!(versions, vec!["5.4.0", "6.0.0", "7.0.0"]);
    }

    #[tokio::test]
    async fn unpublished_latest_release_is_dropped() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = MetadataCache::new(temp.path());
        cache
            .store("gcs-.json", br#"{"prefixes": ["6.0.0/", "7.0.0/"]}"#)
            .await
            .unwrap();
        cache
            .store("gcs-7-0-0-release-.json", br#"{"prefixes": []}"#)
            .await
            .unwrap();

        let repo = GcsRepo::new(cache, Platform::detect().unwrap());
        let versions = repo
            .release_versions(&ReleaseFilter::default())
            .await
            .unwrap();

        assert_eq!(versions, vec!["6.0.0"]);
    }

    #[tokio::test]
    async fn candidates_of_newest_version() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = MetadataCache::new(temp.path());
        cache
            .store("gcs-.json", br#"{"prefixes": ["6.0.0/", "7.0.0/"]}"#)
            .await
            .unwrap();
        cache
            .store(
                "gcs-7-0-0-.json",
                br#"{"prefixes": ["7.0.0/rc1/", "7.0.0/rc10/", "7.0.0/rc2/", "7.0.0/rolling/"]}"#,
            )
            .await
            .unwrap();

        let repo = GcsRepo::new(cache, Platform::detect().unwrap());
        let candidates = repo.candidate_versions().await.unwrap();

        assert_eq!(candidates, vec!["7.0.0rc1", "7.0.0rc10", "7.0.0rc2"]);
    }
}
