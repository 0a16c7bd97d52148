//! Collaborator interfaces consumed by the serving engine
//!
//! These traits describe the boundary to the systems modelserve depends on but
//! does not implement: object storage for artifact bytes, the model registry and
//! the external key-value store shared by the feature store and metrics recorder.

use crate::{ArtifactPath, ModelMetadata, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Object storage holding model artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the raw artifact bytes; failures surface as `Error::Download`
    async fn fetch(&self, path: &ArtifactPath) -> Result<Bytes>;
}

/// Source of model metadata
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Look up metadata; a miss is `Error::NotFound`
    async fn get_metadata(&self, model_id: &str) -> Result<ModelMetadata>;
}

/// External key-value store with TTLs, prefix scans and time-ordered series
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a string value; expired or absent keys yield `None`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value with an optional expiry
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Delete keys of any type, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Enumerate live keys matching a glob pattern (`*` wildcard only)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically add `by` to an integer counter, returning the new value
    async fn incr(&self, key: &str, by: i64) -> Result<i64>;

    /// Append a member to a series ordered by `score`
    async fn series_append(&self, key: &str, score: f64, member: String) -> Result<()>;

    /// Up to `count` members with the highest scores, newest first
    async fn series_latest(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Drop all but the `keep` newest members, returning how many were removed
    async fn series_trim(&self, key: &str, keep: usize) -> Result<u64>;
}

/// Match `key` against a glob `pattern` where `*` matches any run of characters
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if key.len() < first.len() + last.len() || !key.starts_with(first) || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];

    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    true
}

/// Convert a timeout in milliseconds into a `Duration`, treating 0 as "no limit"
pub fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_exact_match() {
        assert!(glob_match("feature:u1:age", "feature:u1:age"));
        assert!(!glob_match("feature:u1:age", "feature:u1:agex"));
    }

    #[test]
    fn test_glob_prefix_wildcard() {
        assert!(glob_match("feature:u1:*", "feature:u1:age"));
        assert!(glob_match("feature:u1:*", "feature:u1:"));
        assert!(!glob_match("feature:u1:*", "feature:u10:age"));
        assert!(!glob_match("feature:u1:*", "feature:u2:age"));
    }

    #[test]
    fn test_glob_inner_wildcards() {
        assert!(glob_match("model:*:latency:*", "model:metrics:latency:churn"));
        assert!(!glob_match("model:*:latency:*", "model:metrics:confidence:churn"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "abc"));
        assert!(!glob_match("a*b*c", "acb"));
    }

    #[test]
    fn test_timeout_from_ms() {
        assert_eq!(timeout_from_ms(0), None);
        assert_eq!(timeout_from_ms(250), Some(Duration::from_millis(250)));
    }
}
