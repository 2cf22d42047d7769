use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::time::{Duration, Instant as StdInstant};

use super::error::CacheResult;

/// Unbounded backing tier for entries evicted from L2
///
/// The storage format is up to the implementation.
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn keys(&self) -> CacheResult<Vec<String>>;

    async fn len(&self) -> CacheResult<usize>;

    async fn clear(&self) -> CacheResult<()>;
}

#[derive(Debug, Clone)]
struct ColdEntry {
    value: Value,
    ttl: Duration,
}

/// Expires every cold entry after its own TTL; a re-`put` restarts the clock
struct ColdExpiry;

impl Expiry<String, ColdEntry> for ColdExpiry {
    fn expire_after_create(&self, _key: &String, entry: &ColdEntry, _created_at: StdInstant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &ColdEntry,
        _updated_at: StdInstant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory cold tier (for tests and single-process deployments)
///
/// Backed by moka, which drops expired entries on its own maintenance runs.
#[derive(Clone)]
pub struct InMemoryColdStore {
    entries: Cache<String, ColdEntry>,
}

impl Default for InMemoryColdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        let entries = Cache::builder().expire_after(ColdExpiry).build();
        Self { entries }
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), ColdEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.entries.run_pending_tasks().await;
        Ok(self
            .entries
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn len(&self) -> CacheResult<usize> {
        self.entries.run_pending_tasks().await;
        Ok(self.entries.iter().count())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cold_store_round_trip() {
        let store = InMemoryColdStore::new();
        store
            .put("k", json!({"a": 1}), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cold_store_expiry() {
        let store = InMemoryColdStore::new();
        store
            .put("k", json!(1), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_leave_without_reads() {
        let store = InMemoryColdStore::new();
        store.put("short", json!(1), Duration::from_millis(1)).await.unwrap();
        store.put("long", json!(2), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.keys().await.unwrap(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_put_restarts_ttl() {
        let store = InMemoryColdStore::new();
        store.put("k", json!(1), Duration::from_millis(1)).await.unwrap();
        store.put("k", json!(2), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
