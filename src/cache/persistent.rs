use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::{KeyValueStore, StoreError};
use crate::models::GeocodeResult;

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_KEY_PREFIX: &str = "geocode_cache_";

/// Stored form of one cached city, timestamps in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub timestamp: i64,
    pub expires_at: i64,
    pub data: GeocodeResult,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub valid: usize,
    pub approx_size_bytes: usize,
}

/// TTL cache of resolved cities on top of a [`KeyValueStore`].
///
/// Never fails: a missing or broken store turns every operation into a
/// logged no-op.
pub struct PersistentCache {
    store: Option<Arc<dyn KeyValueStore>>,
    prefix: String,
    ttl: Duration,
    jitter: f64,
}

impl PersistentCache {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
            jitter: 0.0,
        }
    }

    /// A cache with no backing store.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            store: None,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
            jitter: 0.0,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Default TTL and the relative spread applied to it on each write.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration, jitter: f64) -> Self {
        self.ttl = ttl;
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    fn storage_key(&self, city_key: &str) -> String {
        format!("{}{}", self.prefix, city_key.trim().to_lowercase())
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Fresh entry for `city_key`; expired or unreadable entries are deleted.
    #[tracing::instrument(name = "query_persistent_cache", level = "debug", skip(self))]
    pub fn get(&self, city_key: &str) -> Option<GeocodeResult> {
        let store = self.store.as_ref()?;
        let key = self.storage_key(city_key);

        let raw = match store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Key not found");
                return None;
            }
            Err(e) => {
                warn!("Persistent cache read failed: {}", e);
                return None;
            }
        };

        let entry = match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.remove_key(store.as_ref(), &key);
                return None;
            }
        };

        let now = Self::now();
        if entry.is_expired(now) {
            debug!("Key found but expired");
            self.remove_key(store.as_ref(), &key);
            return None;
        }

        debug!(
            "Key found and still fresh, cached {} minutes ago",
            (now - entry.timestamp) / 60_000
        );
        Some(entry.data)
    }

    /// Store with the default TTL (jittered when configured).
    pub fn put(&self, city_key: &str, result: &GeocodeResult) {
        let ttl = if self.jitter > 0.0 {
            let factor: f64 = rand::rng().random_range((1.0 - self.jitter)..(1.0 + self.jitter));
            self.ttl.mul_f64(factor)
        } else {
            self.ttl
        };
        self.put_with_ttl(city_key, result, ttl);
    }

    #[tracing::instrument(name = "put_persistent_cache", level = "debug", skip(self, result))]
    pub fn put_with_ttl(&self, city_key: &str, result: &GeocodeResult, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let now = Self::now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            timestamp: now,
            expires_at: now.saturating_add(ttl_ms),
            data: result.clone(),
        };
        let value = match serde_json::to_string(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize cache entry: {}", e);
                return;
            }
        };

        let key = self.storage_key(city_key);
        match store.set(&key, &value) {
            Ok(()) => {}
            Err(StoreError::CapacityExceeded) => {
                let removed = self.sweep_expired();
                debug!("Cache full, swept {} expired entries before retrying", removed);
                if let Err(e) = store.set(&key, &value) {
                    debug!("Giving up on caching {}: {}", key, e);
                }
            }
            Err(e) => warn!("Persistent cache write failed: {}", e),
        }
    }

    pub fn remove(&self, city_key: &str) {
        if let Some(store) = self.store.as_ref() {
            self.remove_key(store.as_ref(), &self.storage_key(city_key));
        }
    }

    fn remove_key(&self, store: &dyn KeyValueStore, key: &str) {
        if let Err(e) = store.remove(key) {
            warn!("Persistent cache delete failed for {}: {}", key, e);
        }
    }

    fn entries(&self, store: &dyn KeyValueStore) -> Vec<(String, Option<String>)> {
        let keys = match store.keys_with_prefix(&self.prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Persistent cache scan failed: {}", e);
                return Vec::new();
            }
        };
        keys.into_iter()
            .map(|key| {
                let value = store.get(&key).ok().flatten();
                (key, value)
            })
            .collect()
    }

    /// Delete every expired or unreadable entry, returning how many went.
    #[tracing::instrument(name = "sweep_persistent_cache", level = "debug", skip(self))]
    pub fn sweep_expired(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };

        let now = Self::now();
        let mut removed = 0;
        for (key, value) in self.entries(store.as_ref()) {
            let Some(value) = value else {
                continue;
            };
            let stale = serde_json::from_str::<CacheEntry>(&value)
                .map(|entry| entry.is_expired(now))
                .unwrap_or(true);
            if stale {
                self.remove_key(store.as_ref(), &key);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Cleaned up {} expired geocode cache entries", removed);
        }
        removed
    }

    /// Unreadable entries count as expired.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let Some(store) = self.store.as_ref() else {
            return CacheStats::default();
        };

        let now = Self::now();
        let mut stats = CacheStats::default();
        for (key, value) in self.entries(store.as_ref()) {
            let Some(value) = value else {
                continue;
            };
            stats.total += 1;
            stats.approx_size_bytes += key.len() + value.len();
            match serde_json::from_str::<CacheEntry>(&value) {
                Ok(entry) if !entry.is_expired(now) => stats.valid += 1,
                _ => stats.expired += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::models::{GeoCoordinate, Source};

    fn paris() -> GeocodeResult {
        GeocodeResult::new(GeoCoordinate::new(2.3522, 48.8566).unwrap(), Source::OpenStreetMap)
    }

    fn write_raw(store: &MemoryStore, key: &str, expires_at: i64) {
        let entry = CacheEntry {
            timestamp: 0,
            expires_at,
            data: paris(),
        };
        store
            .set(key, &serde_json::to_string(&entry).unwrap())
            .unwrap();
    }

    #[test]
    fn test_put_then_get_returns_same_data() {
        let cache = PersistentCache::new(Arc::new(MemoryStore::new()));
        cache.put("Paris", &paris());
        assert_eq!(cache.get("paris"), Some(paris()));
    }

    #[test]
    fn test_entry_layout() {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistentCache::new(store.clone());
        cache.put("Paris", &paris());

        let raw = store.get("geocode_cache_paris").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json["timestamp"].is_i64());
        assert!(json["expiresAt"].is_i64());
        assert_eq!(json["data"]["source"], "openstreetmap");
        let ttl = json["expiresAt"].as_i64().unwrap() - json["timestamp"].as_i64().unwrap();
        assert_eq!(ttl, 7 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn test_expired_entry_is_deleted_on_read() {
        let store = Arc::new(MemoryStore::new());
        write_raw(&store, "geocode_cache_paris", 1);
        let cache = PersistentCache::new(store.clone());

        assert_eq!(cache.stats().expired, 1);
        assert_eq!(cache.get("paris"), None);
        assert_eq!(store.get("geocode_cache_paris").unwrap(), None);
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn test_sweep_and_stats() {
        let store = Arc::new(MemoryStore::new());
        write_raw(&store, "geocode_cache_old", 1);
        store.set("geocode_cache_garbage", "not json").unwrap();
        store.set("unrelated", "keep").unwrap();
        let cache = PersistentCache::new(store.clone());
        cache.put("paris", &paris());

        let stats = cache.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.valid, 1);
        assert!(stats.approx_size_bytes > 0);

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.stats().total, 1);
        assert_eq!(store.get("unrelated").unwrap().as_deref(), Some("keep"));
    }

    #[test]
    fn test_capacity_error_sweeps_and_retries() {
        let probe = serde_json::to_string(&CacheEntry {
            timestamp: Utc::now().timestamp_millis(),
            expires_at: Utc::now().timestamp_millis(),
            data: paris(),
        })
        .unwrap();
        // Room for roughly one entry
        let store = Arc::new(MemoryStore::with_quota(probe.len() + 40));
        write_raw(&store, "geocode_cache_old", 1);
        let cache = PersistentCache::new(store.clone());

        cache.put("paris", &paris());
        assert_eq!(store.get("geocode_cache_old").unwrap(), None);
        assert_eq!(cache.get("paris"), Some(paris()));
    }

    #[test]
    fn test_capacity_error_gives_up_silently() {
        let cache = PersistentCache::new(Arc::new(MemoryStore::with_quota(8)));
        cache.put("paris", &paris());
        assert_eq!(cache.get("paris"), None);
    }

    #[test]
    fn test_unavailable_store_is_a_noop() {
        let cache = PersistentCache::unavailable();
        cache.put("paris", &paris());
        cache.remove("paris");
        assert_eq!(cache.get("paris"), None);
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_jittered_ttl_stays_within_spread() {
        let store = Arc::new(MemoryStore::new());
        let cache = PersistentCache::new(store.clone()).with_ttl(Duration::from_secs(1000), 0.1);
        cache.put("paris", &paris());

        let raw = store.get("geocode_cache_paris").unwrap().unwrap();
        let entry: CacheEntry = serde_json::from_str(&raw).unwrap();
        let ttl = entry.expires_at - entry.timestamp;
        assert!((900_000..=1_100_000).contains(&ttl));
    }
}
