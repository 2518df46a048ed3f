//! TTL-gated read-through cache: cached, else remote, else fallback.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use coursesync_common::Result;

use crate::clock::{Clock, SystemClock};
use crate::store::KeyValueStore;

/// Configuration for the cache gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied by [`CachedItemStore::get_cached`].
    pub default_ttl_ms: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60 * 60 * 1000,
        }
    }
}

/// Freshness record stored next to each cached payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TtlRecord {
    stored_at: i64,
    ttl_ms: i64,
}

impl TtlRecord {
    fn is_fresh(&self, now: i64) -> bool {
        now - self.stored_at < self.ttl_ms
    }
}

/// Read-through cache over a [`KeyValueStore`].
///
/// The payload lives under `data_prefix + namespace`, its freshness record
/// under `ttl_prefix + namespace`. Only successful remote fetches are
/// written back; fallback results are never cached, so the next call after a
/// fallback hit tries the remote again.
pub struct CachedItemStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl CachedItemStore {
    /// Create a cache gate using the system clock.
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a cache gate with an explicit clock.
    pub fn with_clock(store: Arc<dyn KeyValueStore>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, config }
    }

    /// Resolve `namespace` with the configured default TTL.
    ///
    /// # Errors
    /// - When the cache misses and both `remote` and `fallback` fail, the
    ///   fallback's error is returned; the remote error is only logged.
    pub async fn get_cached<T, R, RF, F, FF>(
        &self,
        namespace: &str,
        data_prefix: &str,
        ttl_prefix: &str,
        remote: R,
        fallback: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        R: FnOnce() -> RF + Send,
        RF: Future<Output = Result<T>> + Send,
        F: FnOnce() -> FF + Send,
        FF: Future<Output = Result<T>> + Send,
    {
        self.get_cached_with_ttl(
            namespace,
            data_prefix,
            ttl_prefix,
            self.config.default_ttl_ms,
            remote,
            fallback,
        )
        .await
    }

    /// Resolve `namespace`, storing remote results with `ttl_ms`.
    pub async fn get_cached_with_ttl<T, R, RF, F, FF>(
        &self,
        namespace: &str,
        data_prefix: &str,
        ttl_prefix: &str,
        ttl_ms: i64,
        remote: R,
        fallback: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        R: FnOnce() -> RF + Send,
        RF: Future<Output = Result<T>> + Send,
        F: FnOnce() -> FF + Send,
        FF: Future<Output = Result<T>> + Send,
    {
        let data_key = format!("{}{}", data_prefix, namespace);
        let ttl_key = format!("{}{}", ttl_prefix, namespace);

        if let Some(cached) = self.read_fresh::<T>(&data_key, &ttl_key).await {
            debug!("Cache hit for {}", data_key);
            return Ok(cached);
        }

        match remote().await {
            Ok(data) => {
                if let Err(e) = self.persist(&data_key, &ttl_key, ttl_ms, &data).await {
                    warn!("Failed to cache {}: {}", data_key, e);
                }
                Ok(data)
            }
            Err(remote_err) => {
                warn!("Remote fetch for {} failed, using fallback: {}", data_key, remote_err);
                fallback().await
            }
        }
    }

    async fn read_fresh<T: DeserializeOwned>(&self, data_key: &str, ttl_key: &str) -> Option<T> {
        let record = match self.store.get_value(ttl_key).await {
            Ok(Some(raw)) => serde_json::from_str::<TtlRecord>(&raw).ok()?,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cache ttl {}: {}", ttl_key, e);
                return None;
            }
        };

        if !record.is_fresh(self.clock.now_millis()) {
            debug!("Cache entry {} is stale", data_key);
            return None;
        }

        match self.store.get_value(data_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", data_key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", data_key, e);
                None
            }
        }
    }

    async fn persist<T: Serialize>(&self, data_key: &str, ttl_key: &str, ttl_ms: i64, data: &T) -> Result<()> {
        let payload = serde_json::to_string(data)?;
        let record = serde_json::to_string(&TtlRecord {
            stored_at: self.clock.now_millis(),
            ttl_ms,
        })?;

        self.store.set_value(data_key, &payload).await?;
        self.store.set_value(ttl_key, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use coursesync_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        cache: CachedItemStore,
        remote_calls: Arc<AtomicU32>,
        fallback_calls: Arc<AtomicU32>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = CachedItemStore::with_clock(
            store.clone(),
            CacheConfig { default_ttl_ms: 1_000 },
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            cache,
            remote_calls: Arc::new(AtomicU32::new(0)),
            fallback_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    impl Fixture {
        async fn fetch(&self, remote: Result<String>, fallback: Result<String>) -> Result<String> {
            let remote_calls = self.remote_calls.clone();
            let fallback_calls = self.fallback_calls.clone();
            self.cache
                .get_cached(
                    "en",
                    "faq-",
                    "ttl_faq-",
                    move || async move {
                        remote_calls.fetch_add(1, Ordering::SeqCst);
                        remote
                    },
                    move || async move {
                        fallback_calls.fetch_add(1, Ordering::SeqCst);
                        fallback
                    },
                )
                .await
        }
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_remote_and_fallback() {
        let f = fixture();
        let first = f.fetch(Ok("remote".into()), Ok("file".into())).await.unwrap();
        assert_eq!(first, "remote");

        f.clock.advance(999);
        let second = f.fetch(Ok("other".into()), Ok("file".into())).await.unwrap();
        assert_eq!(second, "remote");
        assert_eq!(f.remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_refetches_and_updates_timestamp() {
        let f = fixture();
        f.fetch(Ok("v1".into()), Ok("file".into())).await.unwrap();

        f.clock.advance(1_000);
        let refreshed = f.fetch(Ok("v2".into()), Ok("file".into())).await.unwrap();
        assert_eq!(refreshed, "v2");
        assert_eq!(f.remote_calls.load(Ordering::SeqCst), 2);

        let raw = f.store.get_value("ttl_faq-en").await.unwrap().unwrap();
        let record: TtlRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.stored_at, 1_001_000);
        assert_eq!(
            f.store.get_value("faq-en").await.unwrap().as_deref(),
            Some("\"v2\"")
        );
    }

    #[tokio::test]
    async fn test_fallback_result_is_not_cached() {
        let f = fixture();
        let value = f
            .fetch(Err(Error::Network("offline".into())), Ok("file".into()))
            .await
            .unwrap();
        assert_eq!(value, "file");
        assert_eq!(f.store.value_count(), 0);

        let value = f.fetch(Ok("remote".into()), Ok("file".into())).await.unwrap();
        assert_eq!(value, "remote");
        assert_eq!(f.remote_calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_fallback_error() {
        let f = fixture();
        let err = f
            .fetch(
                Err(Error::Network("offline".into())),
                Err(Error::NotFound("faq-en.json".into())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let f = fixture();
        f.fetch(Ok("v1".into()), Ok("file".into())).await.unwrap();
        f.store.set_value("faq-en", "{not json").await.unwrap();

        let value = f.fetch(Ok("v2".into()), Ok("file".into())).await.unwrap();
        assert_eq!(value, "v2");
    }
}
