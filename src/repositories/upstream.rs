//! Upstream release listing with fallback
//!
//! Releases are listed from GitHub first. If that fails (rate limiting,
//! outages) the GCS bucket is tried once before giving up.

use crate::error::BazeliskResult;
use crate::repositories::{Destination, ForkRepo, ReleaseFilter, ReleaseRepo};
use crate::version::UPSTREAM;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Upstream releases: GitHub listing, GCS fallback, GCS downloads
pub struct UpstreamReleases {
    github: Arc<dyn ForkRepo>,
    gcs: Arc<dyn ReleaseRepo>,
}

impl UpstreamReleases {
    pub fn new(github: Arc<dyn ForkRepo>, gcs: Arc<dyn ReleaseRepo>) -> Self {
        Self { github, gcs }
    }
}

#[async_trait]
impl ReleaseRepo for UpstreamReleases {
    async fn release_versions(&self, filter: &ReleaseFilter) -> BazeliskResult<Vec<String>> {
        match self.github.fork_versions(UPSTREAM).await {
            Ok(versions) => Ok(versions.into_iter().filter(|v| filter.matches(v)).collect()),
            Err(e) => {
                warn!("Falling back to GCS due to GitHub error: {}", e);
                self.gcs.release_versions(filter).await
            }
        }
    }

    async fn download_release(&self, version: &str, dest: &Destination) -> BazeliskResult<PathBuf> {
        self.gcs.download_release(version, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BazeliskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingGitHub;

    #[async_trait]
    impl ForkRepo for FailingGitHub {
        async fn fork_versions(&self, _fork: &str) -> BazeliskResult<Vec<String>> {
            Err(BazeliskError::HttpStatus {
                url: "https://api.github.com/repos/bazelbuild/bazel/releases".to_string(),
                status: 403,
            })
        }

        async fn download_fork_version(
            &self,
            _fork: &str,
            _version: &str,
            _dest: &Destination,
        ) -> BazeliskResult<PathBuf> {
            unreachable!("upstream downloads never go through GitHub")
        }
    }

    #[derive(Default)]
    struct CountingGcs {
        listings: AtomicUsize,
    }

    #[async_trait]
    impl ReleaseRepo for CountingGcs {
        async fn release_versions(&self, filter: &ReleaseFilter) -> BazeliskResult<Vec<String>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(["5.4.0", "6.4.0"]
                .iter()
                .filter(|v| filter.matches(v))
                .map(|v| v.to_string())
                .collect())
        }

        async fn download_release(
            &self,
            _version: &str,
            dest: &Destination,
        ) -> BazeliskResult<PathBuf> {
            Ok(dest.path())
        }
    }

    #[tokio::test]
    async fn falls_back_to_gcs_once() {
        let gcs = Arc::new(CountingGcs::default());
        let upstream = UpstreamReleases::new(Arc::new(FailingGitHub), gcs.clone());

        let filter = ReleaseFilter {
            track: Some("6.".to_string()),
        };
        let versions = upstream.release_versions(&filter).await.unwrap();

        assert_eq!(versions, vec!["6.4.0"]);
        assert_eq!(gcs.listings.load(Ordering::SeqCst), 1);
    }
}
