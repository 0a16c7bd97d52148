//! In-memory key-value store with expiry, prefix scans and ordered series
//!
//! Backs the feature store client and the metrics recorder when no external
//! store is configured, and in tests. Entries live in a sharded map, so writers
//! on different keys do not contend.

use async_trait::async_trait;
use dashmap::DashMap;
use serve_core::traits::glob_match;
use serve_core::{Error, KeyValueStore, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
enum StoredValue {
    Text(String),
    Counter(i64),
    /// Members ordered by ascending score; equal scores keep insertion order
    Series(VecDeque<(f64, String)>),
}

impl StoredValue {
    fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "string",
            StoredValue::Counter(_) => "counter",
            StoredValue::Series(_) => "series",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub expired: AtomicU64,
}

/// Sharded in-memory implementation of [`KeyValueStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<DashMap<String, Entry>>,
    stats: Arc<StoreStats>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including ones that expired but were not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.stats.expired.fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Purged {} expired keys", removed);
        }
        removed
    }

    /// Remove `key` if it has expired
    fn evict_if_expired(&self, key: &str) {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn wrong_type(key: &str, expected: &str, found: &StoredValue) -> Error {
        Error::store(format!(
            "key '{}' holds a {}, expected a {}",
            key,
            found.type_name(),
            expected
        ))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.evict_if_expired(key);
        self.stats.reads.fetch_add(1, Ordering::Relaxed);

        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                StoredValue::Counter(n) => Ok(Some(n.to_string())),
                other => Err(Self::wrong_type(key, "string", other)),
            },
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: StoredValue::Text(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(removed as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now) && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        self.evict_if_expired(key);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(StoredValue::Counter(0)));

        let current = match &entry.value {
            StoredValue::Counter(n) => *n,
            StoredValue::Text(text) => text
                .parse::<i64>()
                .map_err(|_| Error::store(format!("key '{}' does not hold an integer", key)))?,
            other => return Err(Self::wrong_type(key, "counter", other)),
        };

        let next = current
            .checked_add(by)
            .ok_or_else(|| Error::store(format!("counter '{}' overflowed", key)))?;
        entry.value = StoredValue::Counter(next);
        Ok(next)
    }

    async fn series_append(&self, key: &str, score: f64, member: String) -> Result<()> {
        if score.is_nan() {
            return Err(Error::store(format!("NaN score appended to '{}'", key)));
        }
        self.evict_if_expired(key);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(StoredValue::Series(VecDeque::new())));

        match &mut entry.value {
            StoredValue::Series(series) => {
                // Appends almost always arrive in time order
                match series.back() {
                    Some((last, _)) if *last > score => {
                        let pos = series.partition_point(|(s, _)| *s <= score);
                        series.insert(pos, (score, member));
                    }
                    _ => series.push_back((score, member)),
                }
                Ok(())
            }
            other => Err(Self::wrong_type(key, "series", other)),
        }
    }

    async fn series_latest(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.evict_if_expired(key);
        self.stats.reads.fetch_add(1, Ordering::Relaxed);

        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                StoredValue::Series(series) => Ok(series
                    .iter()
                    .rev()
                    .take(count)
                    .map(|(_, member)| member.clone())
                    .collect()),
                other => Err(Self::wrong_type(key, "series", other)),
            },
        }
    }

    async fn series_trim(&self, key: &str, keep: usize) -> Result<u64> {
        match self.entries.get_mut(key) {
            None => Ok(0),
            Some(mut entry) => match &mut entry.value {
                StoredValue::Series(series) => {
                    let excess = series.len().saturating_sub(keep);
                    series.drain(..excess);
                    Ok(excess as u64)
                }
                other => Err(Self::wrong_type(key, "series", other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryKeyValueStore::new();
        store.set("a", "1".to_string(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryKeyValueStore::new();
        store
            .set("short", "x".to_string(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("long", "y".to_string(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.scan("*").await.unwrap(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryKeyValueStore::new();
        for i in 0..3 {
            store
                .set(&format!("k{}", i), "v".to_string(), Some(Duration::from_millis(1)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.purge_expired(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_pattern() {
        let store = MemoryKeyValueStore::new();
        for key in ["feature:u1:a", "feature:u1:b", "feature:u10:a", "model:u1"] {
            store.set(key, "v".to_string(), None).await.unwrap();
        }

        let mut keys = store.scan("feature:u1:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["feature:u1:a".to_string(), "feature:u1:b".to_string()]);
    }

    #[tokio::test]
    async fn test_incr() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.incr("c", 1).await.unwrap(), 1);
        assert_eq!(store.incr("c", 4).await.unwrap(), 5);
        assert_eq!(store.get("c").await.unwrap(), Some("5".to_string()));

        store.set("t", "not a number".to_string(), None).await.unwrap();
        assert!(matches!(store.incr("t", 1).await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_series_ordering_and_trim() {
        let store = MemoryKeyValueStore::new();
        store.series_append("s", 1.0, "a".to_string()).await.unwrap();
        store.series_append("s", 3.0, "c".to_string()).await.unwrap();
        store.series_append("s", 2.0, "b".to_string()).await.unwrap();
        store.series_append("s", 3.0, "d".to_string()).await.unwrap();

        assert_eq!(
            store.series_latest("s", 10).await.unwrap(),
            vec!["d", "c", "b", "a"]
        );
        assert_eq!(store.series_latest("s", 2).await.unwrap(), vec!["d", "c"]);

        assert_eq!(store.series_trim("s", 2).await.unwrap(), 2);
        assert_eq!(store.series_latest("s", 10).await.unwrap(), vec!["d", "c"]);
        assert_eq!(store.series_trim("absent", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let store = MemoryKeyValueStore::new();
        store.series_append("s", 1.0, "a".to_string()).await.unwrap();
        assert!(matches!(store.get("s").await, Err(Error::Store(_))));

        store.set("t", "x".to_string(), None).await.unwrap();
        assert!(store.series_append("t", 1.0, "a".to_string()).await.is_err());
        assert!(store.series_append("s", f64::NAN, "a".to_string()).await.is_err());
    }
}
