//! Time-boxed cache for small remote payloads
//!
//! Release listings, issue searches and last-green commit files are cached
//! as raw bytes under the Bazelisk home directory, one file per logical key.
//! The file's modification time is the fetch timestamp.
//!
//! # Freshness
//!
//! | Age | Behavior |
//! |-----|----------|
//! | < 1 hour | served from disk, no network |
//! | >= 1 hour | refetched and overwritten |
//! | missing | fetched and written |
//!
//! Reads never lock. Writes go to a temporary file that is renamed over the
//! key's file, so readers never see partial content.

use crate::error::{BazeliskError, BazeliskResult};
use crate::http;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// How long a cached payload is served without refetching
pub const FRESHNESS_WINDOW_HOURS: i64 = 1;

/// A cached payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Logical name of the payload
    pub key: String,

    /// Raw fetched bytes
    pub payload: Vec<u8>,

    /// When the payload was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is older than `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        Utc::now() - self.fetched_at >= max_age
    }
}

/// Metadata cache backed by a local directory
#[derive(Debug, Clone)]
pub struct MetadataCache {
    dir: PathBuf,
    max_age: Duration,
    github_token: Option<String>,
}

impl MetadataCache {
    /// Create a cache rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::hours(FRESHNESS_WINDOW_HOURS),
            github_token: None,
        }
    }

    /// Authenticate GitHub API fetches with `token`
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Return the payload for `key`, downloading `url` if the cached copy is
    /// missing or stale. `description` only improves error messages.
    pub async fn get_or_fetch(
        &self,
        key: &str,
        url: &str,
        description: &str,
    ) -> BazeliskResult<Vec<u8>> {
        let token = if url.starts_with("https://api.github.com/") {
            self.github_token.clone()
        } else {
            None
        };

        self.get_or_insert_with(key, || async move {
            http::read_remote_file(url, token.as_deref())
                .await
                .map_err(|e| e.context(format!("could not download {}", description)))
        })
        .await
    }

    /// Return the payload for `key`, calling `fetch` if the cached copy is
    /// missing or stale
    pub async fn get_or_insert_with<F, Fut>(&self, key: &str, fetch: F) -> BazeliskResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BazeliskResult<Vec<u8>>>,
    {
        if let Some(entry) = self.lookup(key).await? {
            if !entry.is_stale(self.max_age) {
                debug!("Using cached {}", key);
                return Ok(entry.payload);
            }
            debug!("Cached {} is stale (fetched {})", key, entry.fetched_at);
        }

        let payload = fetch().await?;
        self.store(key, &payload).await?;
        Ok(payload)
    }

    /// Read the entry for `key`, if present
    pub async fn lookup(&self, key: &str) -> BazeliskResult<Option<CacheEntry>> {
        let path = self.cache_path(key);

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => return Ok(None),
        };

        let modified = metadata
            .modified()
            .map_err(|e| BazeliskError::io(format!("reading mtime of {}", path.display()), e))?;

        let payload = fs::read(&path)
            .await
            .map_err(|e| BazeliskError::io(format!("could not read {}", path.display()), e))?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Write the payload for `key`, replacing any previous entry
    pub async fn store(&self, key: &str, payload: &[u8]) -> BazeliskResult<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            BazeliskError::io(format!("creating directory {}", self.dir.display()), e)
        })?;

        let path = self.cache_path(key);
        let temp_path = self.dir.join(format!(".{}-{}", key, Uuid::new_v4()));
        fs::write(&temp_path, payload)
            .await
            .map_err(|e| BazeliskError::io(format!("could not create {}", temp_path.display()), e))?;

        http::install(&temp_path, &path).await?;
        debug!("Cached {} ({} bytes)", key, payload.len());
        Ok(())
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration as StdDuration, SystemTime};
    use tempfile::TempDir;

    fn test_cache() -> (MetadataCache, TempDir) {
        let temp = TempDir::new().unwrap();
        (MetadataCache::new(temp.path()), temp)
    }

    async fn fetch_counting(
        cache: &MetadataCache,
        calls: &AtomicUsize,
        body: &'static [u8],
    ) -> Vec<u8> {
        cache
            .get_or_insert_with("bazelbuild-releases.json", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(body.to_vec())
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_disk() {
        let (cache, _temp) = test_cache();
        let calls = AtomicUsize::new(0);

        assert_eq!(fetch_counting(&cache, &calls, b"[1]").await, b"[1]");
        assert_eq!(fetch_counting(&cache, &calls, b"[2]").await, b"[1]");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entry_is_refetched() {
        let (cache, temp) = test_cache();
        let calls = AtomicUsize::new(0);

        fetch_counting(&cache, &calls, b"old").await;

        let path = temp.path().join("bazelbuild-releases.json");
        let two_hours_ago = SystemTime::now() - StdDuration::from_secs(2 * 3600);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();

        assert_eq!(fetch_counting(&cache, &calls, b"new").await, b"new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn failed_fetch_writes_nothing() {
        let (cache, temp) = test_cache();

        let result = cache
            .get_or_insert_with("flags-7.0", || async {
                Err(BazeliskError::resolution("offline"))
            })
            .await;

        assert!(result.is_err());
        assert!(!temp.path().join("flags-7.0").exists());
    }

    #[tokio::test]
    async fn lookup_missing_returns_none() {
        let (cache, _temp) = test_cache();
        assert!(cache.lookup("nonexistent").await.unwrap().is_none());
    }
}
