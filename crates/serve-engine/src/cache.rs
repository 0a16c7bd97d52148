//! Model cache with single-flight loading
//!
//! The cache owns every loaded model. A load for a given id runs at most once
//! at a time: the first caller spawns the load task and later callers subscribe
//! to its outcome through a watch channel. Load and unload of the same id are
//! serialized by a per-id mutex, while loaded models sit in a sharded map so
//! lookups for different ids do not contend.

use crate::assembler::assemble;
use crate::deadline::bounded;
use crate::dispatch::{decode_artifact, InferenceDispatcher};
use crate::model::{loaded_marker_key, LoadedMarker, LoadedModel};
use crate::recorder::MetricsRecorder;
use crate::telemetry::ServeMetrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serve_core::{
    ArtifactPath, ArtifactStore, EngineConfig, Error, FeatureMap, KeyValueStore, ModelMetadata,
    ModelRegistry, ModelStats, PredictionResult, Result, ServeConfig,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type LoadOutcome = Option<Result<()>>;

/// Owns loaded models and routes predictions to them
#[derive(Clone)]
pub struct ModelCacheManager {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    models: DashMap<String, Arc<LoadedModel>>,

    /// Outcome channels of loads currently running
    inflight: DashMap<String, watch::Receiver<LoadOutcome>>,

    /// Per-id exclusion between load and unload
    slots: DashMap<String, Arc<Mutex<()>>>,

    registry: Arc<dyn ModelRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
    store: Arc<dyn KeyValueStore>,
    recorder: MetricsRecorder,
    dispatcher: InferenceDispatcher,
    metrics: ServeMetrics,
    config: EngineConfig,
}

/// A load running on its own task.
///
/// Dropping the handle detaches the load; it still completes and joins the
/// cache on success.
#[derive(Debug)]
pub struct LoadHandle {
    model_id: String,
    task: JoinHandle<Result<()>>,
}

impl LoadHandle {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the load and return its outcome
    pub async fn wait(self) -> Result<()> {
        self.task.await.map_err(|e| {
            Error::internal(format!("load task for {} did not complete: {}", self.model_id, e))
        })?
    }
}

impl ModelCacheManager {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
        store: Arc<dyn KeyValueStore>,
        config: &ServeConfig,
    ) -> Result<Self> {
        let metrics = ServeMetrics::new()
            .map_err(|e| Error::internal(format!("failed to create serving metrics: {}", e)))?;
        let recorder = MetricsRecorder::new(store.clone(), config.metrics.clone());

        Ok(Self {
            inner: Arc::new(CacheInner {
                models: DashMap::new(),
                inflight: DashMap::new(),
                slots: DashMap::new(),
                registry,
                artifacts,
                store,
                recorder,
                dispatcher: InferenceDispatcher::new(),
                metrics,
                config: config.engine.clone(),
            }),
        })
    }

    /// Prometheus metrics updated by this cache
    pub fn telemetry(&self) -> &ServeMetrics {
        &self.inner.metrics
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.inner.recorder
    }

    /// Load `model_id` from `artifact_path` (`bucket/key`).
    ///
    /// Returns immediately when the model is cached. Concurrent calls for the
    /// same id share one fetch and all observe its outcome; a failed load
    /// leaves nothing behind, so the next call starts afresh.
    pub async fn load(&self, model_id: &str, artifact_path: &str) -> Result<()> {
        self.load_with(model_id, artifact_path, None).await
    }

    /// Load with caller-supplied metadata instead of a registry lookup
    pub async fn load_with_metadata(
        &self,
        metadata: ModelMetadata,
        artifact_path: &str,
    ) -> Result<()> {
        metadata.validate()?;
        let model_id = metadata.model_id.clone();
        self.load_with(&model_id, artifact_path, Some(metadata)).await
    }

    /// Start a load on its own task
    pub fn load_in_background(&self, model_id: &str, artifact_path: &str) -> LoadHandle {
        let cache = self.clone();
        let id = model_id.to_string();
        let path = artifact_path.to_string();
        let task = tokio::spawn(async move { cache.load(&id, &path).await });

        LoadHandle {
            model_id: model_id.to_string(),
            task,
        }
    }

    async fn load_with(
        &self,
        model_id: &str,
        artifact_path: &str,
        metadata: Option<ModelMetadata>,
    ) -> Result<()> {
        if self.is_loaded(model_id) {
            debug!("Model {} already loaded", model_id);
            return Ok(());
        }

        let path = ArtifactPath::parse(artifact_path)?;

        let mut outcome = match self.inner.inflight.entry(model_id.to_string()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight load of {}", model_id);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());

                let inner = self.inner.clone();
                let id = model_id.to_string();
                tokio::spawn(async move {
                    let result = inner.run_load(&id, &path, metadata).await;
                    inner.release_slot(&id);
                    inner.metrics.observe_load(&result);
                    if let Err(e) = &result {
                        warn!("Failed to load model {}: {}", id, e);
                    }
                    tx.send_replace(Some(result));
                    inner.inflight.remove(&id);
                });

                rx
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => {
                // The load task went away without reporting
                self.inner
                    .inflight
                    .remove_if(model_id, |_, rx| rx.has_changed().is_err());
                None
            }
        };

        result.unwrap_or_else(|| {
            Err(Error::internal(format!(
                "load of {} ended without an outcome",
                model_id
            )))
        })
    }

    /// Run one prediction against a loaded model
    pub async fn predict(&self, model_id: &str, features: &FeatureMap) -> Result<PredictionResult> {
        let result = self.run_predict(model_id, features).await;
        if let Err(e) = &result {
            self.inner.metrics.observe_prediction_error(model_id, e);
        }
        result
    }

    async fn run_predict(&self, model_id: &str, features: &FeatureMap) -> Result<PredictionResult> {
        let model = self
            .inner
            .models
            .get(model_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::model_not_loaded(model_id))?;

        let input = assemble(features, &model.metadata)?;

        let started = Instant::now();
        let output = self.inner.dispatcher.dispatch(&model, &input)?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let result = output.into_result(&model, latency_ms)?;

        if let Err(e) = self
            .inner
            .recorder
            .record(model_id, latency_ms, result.confidence)
            .await
        {
            warn!("Failed to record metrics for {}: {}", model_id, e);
        }
        self.inner
            .metrics
            .observe_prediction(model_id, model.metadata.framework, latency_ms);

        debug!("Predicted with {} in {:.3}ms", model_id, latency_ms);
        Ok(result)
    }

    /// Remove a model from the cache. Unloading an absent model succeeds.
    pub async fn unload(&self, model_id: &str) -> Result<()> {
        if !self.is_loaded(model_id) && !self.inner.inflight.contains_key(model_id) {
            debug!("Model {} not loaded, nothing to unload", model_id);
            return Ok(());
        }

        let slot = self.inner.slot(model_id);
        let guard = slot.lock().await;

        let removed = self.inner.models.remove(model_id).is_some();
        if removed {
            self.inner.metrics.set_loaded_models(self.inner.models.len());

            let key = loaded_marker_key(model_id);
            if let Err(e) = bounded(
                self.inner.config.store_timeout(),
                "loaded marker delete",
                self.inner.store.delete(&[key]),
            )
            .await
            {
                warn!("Failed to clear loaded marker for {}: {}", model_id, e);
            }
        }

        drop(guard);
        drop(slot);
        self.inner.release_slot(model_id);

        if removed {
            info!("Unloaded model {}", model_id);
        } else {
            debug!("Model {} not loaded, nothing to unload", model_id);
        }
        Ok(())
    }

    /// Ids of every cached model, in no particular order
    pub fn list_loaded(&self) -> Vec<String> {
        self.inner
            .models
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.inner.models.contains_key(model_id)
    }

    pub fn metadata(&self, model_id: &str) -> Option<ModelMetadata> {
        self.inner
            .models
            .get(model_id)
            .map(|entry| entry.metadata.clone())
    }

    /// Marker written to the key-value store when the model was loaded
    pub async fn loaded_marker(&self, model_id: &str) -> Result<Option<LoadedMarker>> {
        let raw = bounded(
            self.inner.config.store_timeout(),
            "loaded marker read",
            self.inner.store.get(&loaded_marker_key(model_id)),
        )
        .await?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    pub async fn stats(&self, model_id: &str) -> Result<ModelStats> {
        self.inner.recorder.stats(model_id).await
    }
}

impl CacheInner {
    fn slot(&self, model_id: &str) -> Arc<Mutex<()>> {
        self.slots.entry(model_id.to_string()).or_default().clone()
    }

    /// Drop the id's mutex once nobody holds or waits on it
    fn release_slot(&self, model_id: &str) {
        self.slots
            .remove_if(model_id, |_, slot| Arc::strong_count(slot) == 1);
    }

    async fn run_load(
        &self,
        model_id: &str,
        path: &ArtifactPath,
        supplied: Option<ModelMetadata>,
    ) -> Result<()> {
        let started = Instant::now();
        if self.models.contains_key(model_id) {
            return Ok(());
        }

        let metadata = match supplied {
            Some(metadata) => metadata,
            None => {
                let metadata = bounded(
                    self.config.registry_timeout(),
                    "metadata lookup",
                    self.registry.get_metadata(model_id),
                )
                .await?;
                metadata.validate()?;
                if metadata.model_id != model_id {
                    return Err(Error::invalid_request(format!(
                        "registry returned metadata for {} when asked for {}",
                        metadata.model_id, model_id
                    )));
                }
                metadata
            }
        };

        let slot = self.slot(model_id);
        let _guard = slot.lock().await;

        if self.models.contains_key(model_id) {
            return Ok(());
        }

        let bytes = bounded(
            self.config.fetch_timeout(),
            "artifact fetch",
            self.artifacts.fetch(path),
        )
        .await?;

        let handle = decode_artifact(metadata.framework, &bytes)?;
        if let Some(width) = handle.input_width() {
            if width != metadata.feature_names.len() {
                return Err(Error::decode(format!(
                    "model {} takes {} inputs but declares {} features",
                    model_id,
                    width,
                    metadata.feature_names.len()
                )));
            }
        }

        let model = LoadedModel::new(metadata, handle);
        self.write_marker(&model).await;

        info!(
            "Loaded model {} ({}, {} bytes) from {} in {:?}",
            model_id,
            model.metadata.framework,
            bytes.len(),
            path,
            started.elapsed()
        );

        self.models.insert(model_id.to_string(), Arc::new(model));
        self.metrics.set_loaded_models(self.models.len());
        Ok(())
    }

    async fn write_marker(&self, model: &LoadedModel) {
        let marker = LoadedMarker::from(model);
        let value = match serde_json::to_string(&marker) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode loaded marker for {}: {}", model.model_id(), e);
                return;
            }
        };

        if let Err(e) = bounded(
            self.config.store_timeout(),
            "loaded marker write",
            self.store.set(
                &loaded_marker_key(model.model_id()),
                value,
                Some(self.config.loaded_marker_ttl()),
            ),
        )
        .await
        {
            warn!("Failed to write loaded marker for {}: {}", model.model_id(), e);
        }
    }
}

impl std::fmt::Debug for ModelCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCacheManager")
            .field("loaded", &self.inner.models.len())
            .field("inflight", &self.inner.inflight.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;
    use serve_dev::fixtures::linear_regression;
    use serve_dev::{create_test_config, MockArtifactStore, MockModelRegistry};

    fn cache() -> (ModelCacheManager, MockArtifactStore, MockModelRegistry) {
        let artifacts = MockArtifactStore::new_default();
        let registry = MockModelRegistry::new_default();
        let cache = ModelCacheManager::new(
            Arc::new(registry.clone()),
            Arc::new(artifacts.clone()),
            Arc::new(MemoryKeyValueStore::new()),
            &create_test_config(),
        )
        .unwrap();
        (cache, artifacts, registry)
    }

    #[tokio::test]
    async fn test_unloading_absent_ids_keeps_no_slots() {
        let (cache, _, _) = cache();
        for i in 0..50 {
            cache.unload(&format!("ghost-{}", i)).await.unwrap();
        }
        assert_eq!(cache.inner.slots.len(), 0);
    }

    #[tokio::test]
    async fn test_slots_released_after_load_and_unload() {
        let (cache, artifacts, registry) = cache();
        let fixture = linear_regression("price");
        fixture.install(&artifacts, &registry).await.unwrap();

        cache.load("price", &fixture.artifact_path).await.unwrap();
        assert_eq!(cache.inner.slots.len(), 0);

        cache.unload("price").await.unwrap();
        assert!(!cache.is_loaded("price"));
        assert_eq!(cache.inner.slots.len(), 0);

        // Registered, but the artifact is missing
        registry.register(linear_regression("broken").metadata).await;
        assert!(cache.load("broken", "models/broken/model.json").await.is_err());
        assert_eq!(cache.inner.slots.len(), 0);
    }
}
