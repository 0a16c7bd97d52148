//! In-process serving engine assembled from configuration

use anyhow::{Context, Result};
use prometheus::Registry;
use serve_core::ServeConfig;
use serve_dev::{FileModelRegistry, FsArtifactStore};
use serve_engine::{FeatureStoreClient, MemoryKeyValueStore, ModelCacheManager, PredictionService};
use std::sync::Arc;
use tracing::debug;

/// Object key a model's artifact is published under when none is given
pub fn default_artifact_path(model_id: &str) -> String {
    format!("models/{}/model.json", model_id)
}

/// Prediction service over local artifacts and metadata
pub struct LocalEngine {
    pub service: PredictionService,
    pub registry: Registry,
}

impl LocalEngine {
    pub fn from_config(config: &ServeConfig) -> Result<Self> {
        debug!(
            "Serving artifacts from {} with metadata in {}",
            config.artifacts.root.display(),
            config.artifacts.metadata_dir.display()
        );

        let store = Arc::new(MemoryKeyValueStore::new());
        let cache = ModelCacheManager::new(
            Arc::new(FileModelRegistry::new(&config.artifacts.metadata_dir)),
            Arc::new(FsArtifactStore::new(&config.artifacts.root)),
            store.clone(),
            config,
        )?;

        let registry = Registry::new();
        cache
            .telemetry()
            .register(&registry)
            .context("failed to register serving metrics")?;

        let features = FeatureStoreClient::new(store, config.feature_store.clone());
        Ok(Self {
            service: PredictionService::new(cache, features),
            registry,
        })
    }

    pub fn cache(&self) -> &ModelCacheManager {
        self.service.cache()
    }

    /// Load `model_id` from `artifact` or its default location
    pub async fn ensure_loaded(&self, model_id: &str, artifact: Option<&str>) -> Result<()> {
        let path = artifact
            .map(str::to_string)
            .unwrap_or_else(|| default_artifact_path(model_id));
        self.cache()
            .load(model_id, &path)
            .await
            .with_context(|| format!("failed to load model {} from {}", model_id, path))
    }
}
