//! TTL cache shared by the source adapters.
//!
//! Each adapter owns one cache exclusively. Reads take a shared lock so
//! concurrent aggregation calls never block each other; only a refresh after
//! a network fetch takes the write lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: RwLock<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value if present and within its TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.read().await;
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!("Cache HIT");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache entry expired");
                None
            }
            None => {
                debug!("Cache MISS");
                None
            }
        }
    }

    /// Returns the value even past its TTL. Used to degrade to known-stale
    /// data when a refresh fails.
    pub async fn get_stale(&self, key: &K) -> Option<V> {
        let cache = self.inner.read().await;
        cache.get(key).map(|entry| entry.value.clone())
    }

    /// Returns values for every key, or None if any key is missing or
    /// expired. A full hit lets an adapter skip the network entirely.
    pub async fn get_all(&self, keys: &[K]) -> Option<Vec<V>> {
        let cache = self.inner.read().await;
        let now = Instant::now();
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match cache.get(key) {
                Some(entry) if entry.expires_at > now => values.push(entry.value.clone()),
                _ => return None,
            }
        }
        debug!(count = values.len(), "Cache HIT for full symbol set");
        Some(values)
    }

    pub async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.write().await;
        cache.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn put_many(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let expires_at = Instant::now() + self.ttl;
        let mut cache = self.inner.write().await;
        for (key, value) in entries {
            cache.insert(key, Entry { value, expires_at });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_cache_get_put() {
        let cache = TtlCache::<String, i32>::new(Duration::from_secs(60));

        assert!(cache.get(&"key1".to_string()).await.is_none());

        cache.put("key1".to_string(), 123).await;
        assert_eq!(cache.get(&"key1".to_string()).await, Some(123));
        assert!(cache.get(&"key2".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_ttl_expiration() {
        let cache = TtlCache::<String, i32>::new(Duration::from_millis(10));

        cache.put("key1".to_string(), 123).await;
        assert_eq!(cache.get(&"key1".to_string()).await, Some(123));

        sleep(Duration::from_millis(20)).await;
        assert!(cache.get(&"key1".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_read_survives_expiry() {
        let cache = TtlCache::<String, i32>::new(Duration::from_millis(10));

        cache.put("key1".to_string(), 123).await;
        sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&"key1".to_string()).await.is_none());
        assert_eq!(cache.get_stale(&"key1".to_string()).await, Some(123));
    }

    #[tokio::test]
    async fn test_get_all_requires_every_key_fresh() {
        let cache = TtlCache::<String, i32>::new(Duration::from_secs(60));

        cache
            .put_many([("a".to_string(), 1), ("b".to_string(), 2)])
            .await;

        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(cache.get_all(&keys).await, Some(vec![1, 2]));

        let keys = vec!["a".to_string(), "missing".to_string()];
        assert!(cache.get_all(&keys).await.is_none());
    }
}
