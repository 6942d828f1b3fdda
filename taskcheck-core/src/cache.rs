//! On-disk cache of calendar feeds.
//!
//! One JSON record per feed URL, named after the SHA-256 of the URL. A record is
//! served as long as it is younger than the caller's freshness duration; after
//! that the feed is re-downloaded, and if the download fails the stale record is
//! served instead.
//!
//! Concurrent access to the same record is serialized with an advisory lock on a
//! sibling `.lock` file: readers take a shared lock, a refresh holds an exclusive
//! lock from the download until the new record has been renamed into place.

use std::fs::{self, File};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{TaskcheckError, TaskcheckResult};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const CACHE_DIR_NAME: &str = "taskcheck";

/// Something that can download a feed body.
pub trait Fetch: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = TaskcheckResult<String>> + Send;
}

/// HTTP(S) downloader backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> TaskcheckResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("taskcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TaskcheckError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(HttpFetcher { client })
    }
}

/// Calendar apps hand out `webcal://` links for plain HTTPS feeds.
fn normalize_url(url: &str) -> String {
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> TaskcheckResult<String> {
        let response = self
            .client
            .get(normalize_url(url))
            .send()
            .await
            .map_err(|e| TaskcheckError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskcheckError::fetch(url, format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| TaskcheckError::fetch(url, e))
    }
}

/// A cached feed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: String,
}

impl CacheRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        let age = now - self.fetched_at;
        match chrono::Duration::from_std(freshness) {
            Ok(freshness) => age < freshness,
            Err(_) => true,
        }
    }
}

/// Handle on the feed cache directory.
pub struct FeedCache<F = HttpFetcher> {
    dir: PathBuf,
    fetcher: F,
}

/// Deterministic record name for `url`.
pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}")
}

impl FeedCache<HttpFetcher> {
    /// Open the cache in the platform cache directory.
    pub fn open_default() -> TaskcheckResult<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| TaskcheckError::Cache("Could not determine cache directory".into()))?
            .join(CACHE_DIR_NAME);
        Self::open(dir)
    }

    pub fn open(dir: impl Into<PathBuf>) -> TaskcheckResult<Self> {
        Ok(Self::with_fetcher(dir, HttpFetcher::new()?))
    }
}

impl<F: Fetch> FeedCache<F> {
    pub fn with_fetcher(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        FeedCache {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn record_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(url)))
    }

    fn lock_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", cache_key(url)))
    }

    /// Return the feed body for `url`, downloading it if the cached copy is
    /// missing or older than `freshness`.
    pub async fn fetch(&self, url: &str, freshness: Duration) -> TaskcheckResult<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let shared = self.lock(url, false).await?;
        let cached = self.read_record(url)?;
        drop(shared);

        if let Some(record) = cached.as_ref().filter(|r| r.is_fresh(Utc::now(), freshness)) {
            debug!(url, fetched_at = %record.fetched_at, "feed served from cache");
            return Ok(record.payload.clone());
        }

        let _exclusive = self.lock(url, true).await?;

        // Another process may have refreshed the record while we waited.
        let cached = self.read_record(url)?;
        if let Some(record) = cached.as_ref().filter(|r| r.is_fresh(Utc::now(), freshness)) {
            debug!(url, "feed refreshed concurrently, using new record");
            return Ok(record.payload.clone());
        }

        let downloaded = match timeout(FETCH_TIMEOUT, self.fetcher.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(TaskcheckError::fetch(
                url,
                format!("timed out after {}s", FETCH_TIMEOUT.as_secs()),
            )),
        };

        match downloaded {
            Ok(payload) => {
                let record = CacheRecord {
                    url: url.to_string(),
                    fetched_at: Utc::now(),
                    payload,
                };
                self.write_record(&record)?;
                debug!(url, bytes = record.payload.len(), "feed downloaded");
                Ok(record.payload)
            }
            Err(err) => match cached {
                Some(record) => {
                    warn!(url, error = %err, fetched_at = %record.fetched_at, "fetch failed, serving stale cache");
                    Ok(record.payload)
                }
                None => Err(err),
            },
        }
    }

    async fn lock(&self, url: &str, exclusive: bool) -> TaskcheckResult<File> {
        let path = self.lock_path(url);
        tokio::task::spawn_blocking(move || -> TaskcheckResult<File> {
            let file = fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            if exclusive {
                file.lock_exclusive()?;
            } else {
                file.lock_shared()?;
            }
            Ok(file)
        })
        .await
        .map_err(|e| TaskcheckError::Cache(format!("lock task failed: {e}")))?
    }

    /// Read the record for `url`; unreadable records count as missing.
    pub fn read_record(&self, url: &str) -> TaskcheckResult<Option<CacheRecord>> {
        let path = self.record_path(url);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cache record");
                Ok(None)
            }
        }
    }

    /// Atomically replace the record for `record.url`.
    pub fn write_record(&self, record: &CacheRecord) -> TaskcheckResult<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.record_path(&record.url);
        let temp = path.with_extension("json.tmp");

        let content = serde_json::to_string(record)
            .map_err(|e| TaskcheckError::Serialization(e.to_string()))?;

        fs::write(&temp, content)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves a fixed body (or fails) and counts calls.
    #[derive(Clone)]
    struct StubFetcher {
        body: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl StubFetcher {
        fn ok(body: &str) -> Self {
            StubFetcher {
                body: Some(body.to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing() -> Self {
            StubFetcher {
                body: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for StubFetcher {
        async fn get(&self, url: &str) -> TaskcheckResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .clone()
                .ok_or_else(|| TaskcheckError::fetch(url, "connection refused"))
        }
    }

    /// Never answers within the fetch timeout.
    struct HangingFetcher;

    impl Fetch for HangingFetcher {
        async fn get(&self, _url: &str) -> TaskcheckResult<String> {
            tokio::time::sleep(FETCH_TIMEOUT * 2).await;
            Ok("too late".to_string())
        }
    }

    const URL: &str = "https://example.com/cal.ics";

    #[test]
    fn cache_key_is_sha256_hex_of_url() {
        let key = cache_key(URL);
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key(URL));
        assert_ne!(key, cache_key("https://example.com/other.ics"));
    }

    #[test]
    fn webcal_urls_are_fetched_over_https() {
        assert_eq!(normalize_url("webcal://example.com/a.ics"), "https://example.com/a.ics");
        assert_eq!(normalize_url("http://example.com/a.ics"), "http://example.com/a.ics");
    }

    #[tokio::test]
    async fn downloads_and_writes_record_when_missing() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::ok("BEGIN:VCALENDAR");
        let cache = FeedCache::with_fetcher(dir.path().join("feeds"), fetcher.clone());

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "BEGIN:VCALENDAR");
        assert_eq!(fetcher.calls(), 1);
        let record = cache.read_record(URL).unwrap().unwrap();
        assert_eq!(record.payload, "BEGIN:VCALENDAR");
        assert_eq!(record.url, URL);
    }

    #[tokio::test]
    async fn fresh_record_skips_network() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::ok("new");
        let cache = FeedCache::with_fetcher(dir.path(), fetcher.clone());
        cache
            .write_record(&CacheRecord {
                url: URL.into(),
                fetched_at: Utc::now(),
                payload: "cached".into(),
            })
            .unwrap();

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "cached");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn expired_record_is_refreshed() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::ok("new");
        let cache = FeedCache::with_fetcher(dir.path(), fetcher.clone());
        cache
            .write_record(&CacheRecord {
                url: URL.into(),
                fetched_at: Utc::now() - chrono::Duration::hours(2),
                payload: "old".into(),
            })
            .unwrap();

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "new");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.read_record(URL).unwrap().unwrap().payload, "new");
    }

    #[tokio::test]
    async fn stale_record_is_served_when_refresh_fails() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::failing();
        let cache = FeedCache::with_fetcher(dir.path(), fetcher.clone());
        let fetched_at = Utc::now() - chrono::Duration::hours(2);
        cache
            .write_record(&CacheRecord {
                url: URL.into(),
                fetched_at,
                payload: "stale".into(),
            })
            .unwrap();

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "stale");
        assert_eq!(fetcher.calls(), 1);
        // The stale record is left untouched.
        assert_eq!(cache.read_record(URL).unwrap().unwrap().fetched_at, fetched_at);
    }

    #[tokio::test]
    async fn failure_without_record_propagates() {
        let dir = TempDir::new().unwrap();
        let cache = FeedCache::with_fetcher(dir.path(), StubFetcher::failing());

        let err = cache.fetch(URL, Duration::from_secs(900)).await.unwrap_err();

        assert!(matches!(err, TaskcheckError::Fetch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out_to_stale_record() {
        let dir = TempDir::new().unwrap();
        let cache = FeedCache::with_fetcher(dir.path(), HangingFetcher);
        cache
            .write_record(&CacheRecord {
                url: URL.into(),
                fetched_at: Utc::now() - chrono::Duration::hours(2),
                payload: "stale".into(),
            })
            .unwrap();

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "stale");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_without_record_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let cache = FeedCache::with_fetcher(dir.path(), HangingFetcher);

        let err = cache.fetch(URL, Duration::from_secs(900)).await.unwrap_err();

        match err {
            TaskcheckError::Fetch { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert!(cache.read_record(URL).unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::ok("fresh");
        let cache = FeedCache::with_fetcher(dir.path(), fetcher.clone());
        fs::write(cache.record_path(URL), "{not json").unwrap();

        let body = cache.fetch(URL, Duration::from_secs(900)).await.unwrap();

        assert_eq!(body, "fresh");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_fetches_of_same_url_download_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::ok("body");
        let cache = Arc::new(FeedCache::with_fetcher(dir.path(), fetcher.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.fetch(URL, Duration::from_secs(900)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "body");
        }

        assert_eq!(fetcher.calls(), 1);
    }
}
