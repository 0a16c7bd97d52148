//! Mock artifact store and model registry for testing

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use serve_core::{ArtifactPath, ArtifactStore, Error, ModelMetadata, ModelRegistry, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Simulated latency and failure behaviour of a mock collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct MockBehavior {
    /// Base latency per call (milliseconds)
    pub base_latency_ms: u64,

    /// Latency variance (milliseconds)
    pub latency_variance_ms: u64,

    /// Probability of a call failing (0.0 to 1.0)
    pub failure_rate: f64,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            base_latency_ms: 0,
            latency_variance_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockBehavior {
    /// Fixed latency, no failures
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            base_latency_ms: latency.as_millis() as u64,
            ..Self::default()
        }
    }

    async fn simulate(&self) -> bool {
        let (delay_ms, fail) = {
            let mut rng = rand::thread_rng();
            let jitter = if self.latency_variance_ms > 0 {
                rng.gen_range(0..=self.latency_variance_ms)
            } else {
                0
            };
            let fail = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate.min(1.0));
            (self.base_latency_ms + jitter, fail)
        };

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        fail
    }
}

/// In-memory artifact store that counts fetches
#[derive(Debug, Clone)]
pub struct MockArtifactStore {
    inner: Arc<MockArtifactStoreInner>,
}

#[derive(Debug)]
struct MockArtifactStoreInner {
    artifacts: RwLock<HashMap<ArtifactPath, Bytes>>,

    /// Error returned by every fetch while set
    forced_error: RwLock<Option<Error>>,

    fetches: AtomicUsize,
    behavior: MockBehavior,
}

impl MockArtifactStore {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            inner: Arc::new(MockArtifactStoreInner {
                artifacts: RwLock::new(HashMap::new()),
                forced_error: RwLock::new(None),
                fetches: AtomicUsize::new(0),
                behavior,
            }),
        }
    }

    pub fn new_default() -> Self {
        Self::new(MockBehavior::default())
    }

    /// Store `bytes` under `path` (`bucket/key`)
    pub async fn insert(&self, path: &str, bytes: impl Into<Bytes>) -> Result<()> {
        let path = ArtifactPath::parse(path)?;
        self.inner.artifacts.write().await.insert(path, bytes.into());
        Ok(())
    }

    /// Make every fetch fail with `error` until cleared
    pub async fn fail_with(&self, error: Error) {
        *self.inner.forced_error.write().await = Some(error);
    }

    pub async fn clear_failure(&self) {
        *self.inner.forced_error.write().await = None;
    }

    /// Number of fetch calls so far, including failed ones
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn fetch(&self, path: &ArtifactPath) -> Result<Bytes> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        debug!("Mock fetch of {}", path);

        if self.inner.behavior.simulate().await {
            return Err(Error::download(format!("simulated failure fetching {}", path)));
        }

        if let Some(error) = self.inner.forced_error.read().await.clone() {
            return Err(error);
        }

        self.inner
            .artifacts
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| Error::download(format!("no such object: {}", path)))
    }
}

/// In-memory model registry
#[derive(Debug, Clone)]
pub struct MockModelRegistry {
    inner: Arc<MockModelRegistryInner>,
}

#[derive(Debug)]
struct MockModelRegistryInner {
    models: RwLock<HashMap<String, ModelMetadata>>,
    lookups: AtomicUsize,
    behavior: MockBehavior,
}

impl MockModelRegistry {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            inner: Arc::new(MockModelRegistryInner {
                models: RwLock::new(HashMap::new()),
                lookups: AtomicUsize::new(0),
                behavior,
            }),
        }
    }

    pub fn new_default() -> Self {
        Self::new(MockBehavior::default())
    }

    pub async fn register(&self, metadata: ModelMetadata) {
        self.inner
            .models
            .write()
            .await
            .insert(metadata.model_id.clone(), metadata);
    }

    pub async fn remove(&self, model_id: &str) -> Option<ModelMetadata> {
        self.inner.models.write().await.remove(model_id)
    }

    pub fn lookup_count(&self) -> usize {
        self.inner.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRegistry for MockModelRegistry {
    async fn get_metadata(&self, model_id: &str) -> Result<ModelMetadata> {
        self.inner.lookups.fetch_add(1, Ordering::SeqCst);

        if self.inner.behavior.simulate().await {
            return Err(Error::store(format!(
                "simulated registry failure for {}",
                model_id
            )));
        }

        self.inner
            .models
            .read()
            .await
            .get(model_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("model {} is not registered", model_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serve_core::{Framework, TaskKind};
    use std::time::Instant;

    #[tokio::test]
    async fn test_artifact_store_fetch_and_count() {
        let store = MockArtifactStore::new_default();
        store.insert("models/churn/v1.json", "{}").await.unwrap();

        let path = ArtifactPath::parse("models/churn/v1.json").unwrap();
        assert_eq!(store.fetch(&path).await.unwrap(), Bytes::from("{}"));

        let missing = ArtifactPath::parse("models/other.json").unwrap();
        assert!(matches!(store.fetch(&missing).await, Err(Error::Download(_))));
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let store = MockArtifactStore::new_default();
        store.insert("b/k", "x").await.unwrap();
        let path = ArtifactPath::parse("b/k").unwrap();

        store.fail_with(Error::timeout("slow")).await;
        assert_eq!(store.fetch(&path).await, Err(Error::timeout("slow")));

        store.clear_failure().await;
        assert!(store.fetch(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_latency_is_simulated() {
        let store = MockArtifactStore::new(MockBehavior::with_latency(Duration::from_millis(30)));
        store.insert("b/k", "x").await.unwrap();

        let started = Instant::now();
        store.fetch(&ArtifactPath::parse("b/k").unwrap()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_certain_failure_rate() {
        let store = MockArtifactStore::new(MockBehavior {
            failure_rate: 1.0,
            ..MockBehavior::default()
        });
        store.insert("b/k", "x").await.unwrap();
        let err = store.fetch(&ArtifactPath::parse("b/k").unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Download(_)));
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = MockModelRegistry::new_default();
        registry
            .register(ModelMetadata::new(
                "m",
                Framework::TensorGraph,
                TaskKind::Classification,
                vec!["a".to_string()],
            ))
            .await;

        assert_eq!(registry.get_metadata("m").await.unwrap().model_id, "m");
        assert!(matches!(
            registry.get_metadata("other").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(registry.lookup_count(), 2);
    }
}
