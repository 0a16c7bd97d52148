//! Cached entity features in the key-value store

use crate::deadline::bounded;
use serve_core::{Error, FeatureMap, FeatureStoreConfig, FeatureValue, KeyValueStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reads and writes `{prefix}:{entity}:{name}` feature entries
#[derive(Clone)]
pub struct FeatureStoreClient {
    store: Arc<dyn KeyValueStore>,
    config: FeatureStoreConfig,
}

impl FeatureStoreClient {
    pub fn new(store: Arc<dyn KeyValueStore>, config: FeatureStoreConfig) -> Self {
        Self { store, config }
    }

    pub fn feature_key(&self, entity_id: &str, name: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, entity_id, name)
    }

    fn entity_pattern(&self, entity_id: &str) -> String {
        format!("{}:{}:*", self.config.key_prefix, entity_id)
    }

    /// Entity ids must stay inside their own key namespace
    fn check_entity(entity_id: &str) -> Result<()> {
        if entity_id.is_empty() || entity_id.contains(['*', ':']) {
            return Err(Error::invalid_request(format!(
                "entity id '{}' must be non-empty and cannot contain '*' or ':'",
                entity_id
            )));
        }
        Ok(())
    }

    /// Fetch the named features of an entity.
    ///
    /// Absent, expired or unreadable entries are left out of the result.
    pub async fn get(&self, entity_id: &str, names: Option<&[String]>) -> Result<FeatureMap> {
        Self::check_entity(entity_id)?;
        let mut features = FeatureMap::new();
        let Some(names) = names else {
            return Ok(features);
        };

        for name in names {
            let key = self.feature_key(entity_id, name);
            let raw = bounded(self.config.store_timeout(), "feature read", self.store.get(&key))
                .await?;

            if let Some(raw) = raw {
                match serde_json::from_str::<FeatureValue>(&raw) {
                    Ok(value) => {
                        features.insert(name.clone(), value);
                    }
                    Err(e) => warn!("Ignoring unreadable feature {}: {}", key, e),
                }
            }
        }

        debug!(
            "Fetched {}/{} features for entity {}",
            features.len(),
            names.len(),
            entity_id
        );
        Ok(features)
    }

    /// Store features for an entity, one write per entry.
    ///
    /// Entries written before a failure stay written.
    pub async fn set(
        &self,
        entity_id: &str,
        features: &FeatureMap,
        ttl: Option<Duration>,
    ) -> Result<()> {
        Self::check_entity(entity_id)?;
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());

        for (name, value) in features {
            let key = self.feature_key(entity_id, name);
            let raw = serde_json::to_string(value)?;
            bounded(
                self.config.store_timeout(),
                "feature write",
                self.store.set(&key, raw, Some(ttl)),
            )
            .await?;
        }

        debug!("Stored {} features for entity {}", features.len(), entity_id);
        Ok(())
    }

    /// Delete the named features, or every feature of the entity when `names` is `None`
    pub async fn delete(&self, entity_id: &str, names: Option<&[String]>) -> Result<u64> {
        Self::check_entity(entity_id)?;
        let timeout = self.config.store_timeout();
        let keys = match names {
            Some(names) => names
                .iter()
                .map(|name| self.feature_key(entity_id, name))
                .collect::<Vec<_>>(),
            None => {
                let pattern = self.entity_pattern(entity_id);
                bounded(timeout, "feature scan", self.store.scan(&pattern)).await?
            }
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = bounded(timeout, "feature delete", self.store.delete(&keys)).await?;
        debug!("Deleted {} features for entity {}", removed, entity_id);
        Ok(removed)
    }
}

impl std::fmt::Debug for FeatureStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStoreClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;

    fn client() -> (FeatureStoreClient, Arc<MemoryKeyValueStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let client = FeatureStoreClient::new(store.clone(), FeatureStoreConfig::default());
        (client, store)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_then_get_omits_misses() {
        let (client, _) = client();
        let mut features = FeatureMap::new();
        features.insert("age".to_string(), 31.0.into());
        features.insert("plan".to_string(), "team".into());
        client.set("u1", &features, None).await.unwrap();

        let fetched = client
            .get("u1", Some(names(&["age", "plan", "missing"]).as_slice()))
            .await
            .unwrap();
        assert_eq!(fetched, features);
    }

    #[tokio::test]
    async fn test_get_without_names_is_empty() {
        let (client, _) = client();
        let mut features = FeatureMap::new();
        features.insert("age".to_string(), 31.0.into());
        client.set("u1", &features, None).await.unwrap();

        assert!(client.get("u1", None).await.unwrap().is_empty());
        assert!(client.get("u1", Some(&[][..])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ttl_expires_features() {
        let (client, _) = client();
        let mut features = FeatureMap::new();
        features.insert("age".to_string(), 31.0.into());
        client
            .set("u1", &features, Some(Duration::from_millis(20)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(client.get("u1", Some(names(&["age"]).as_slice())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_stays_in_entity_namespace() {
        let (client, store) = client();
        let mut features = FeatureMap::new();
        features.insert("a".to_string(), 1.0.into());
        features.insert("b".to_string(), 2.0.into());
        client.set("u1", &features, None).await.unwrap();
        client.set("u10", &features, None).await.unwrap();

        assert_eq!(client.delete("u1", None).await.unwrap(), 2);
        assert!(client.get("u1", Some(names(&["a", "b"]).as_slice())).await.unwrap().is_empty());
        assert_eq!(store.scan("feature:u10:*").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_named() {
        let (client, _) = client();
        let mut features = FeatureMap::new();
        features.insert("a".to_string(), 1.0.into());
        features.insert("b".to_string(), 2.0.into());
        client.set("u1", &features, None).await.unwrap();

        assert_eq!(client.delete("u1", Some(names(&["a", "zzz"]).as_slice())).await.unwrap(), 1);
        let left = client.get("u1", Some(names(&["a", "b"]).as_slice())).await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left.contains_key("b"));
    }

    #[tokio::test]
    async fn test_wildcard_entity_is_rejected() {
        let (client, store) = client();
        let mut features = FeatureMap::new();
        features.insert("age".to_string(), 31.0.into());
        client.set("alice", &features, None).await.unwrap();
        client.set("bob", &features, None).await.unwrap();

        for entity in ["*", "ali*", "alice:x", ""] {
            let err = client.delete(entity, None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "{}: {:?}", entity, err);
        }
        assert!(client.set("u1:x", &features, None).await.is_err());
        assert!(client.get("*", Some(names(&["age"]).as_slice())).await.is_err());

        assert_eq!(store.scan("feature:*").await.unwrap().len(), 2);
    }
}
