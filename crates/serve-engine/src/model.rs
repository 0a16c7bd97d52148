//! Loaded model instances held by the cache

use crate::dispatch::InferenceBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serve_core::{Framework, ModelMetadata};

/// Metadata and decoded handle of a model, inserted and removed as one unit
#[derive(Debug)]
pub struct LoadedModel {
    pub metadata: ModelMetadata,
    pub handle: Box<dyn InferenceBackend>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn new(metadata: ModelMetadata, handle: Box<dyn InferenceBackend>) -> Self {
        Self {
            metadata,
            handle,
            loaded_at: Utc::now(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.metadata.model_id
    }
}

/// Value of the `model:loaded:{id}` marker in the key-value store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedMarker {
    pub loaded_at: DateTime<Utc>,
    pub framework: Framework,
    pub version: String,
}

impl From<&LoadedModel> for LoadedMarker {
    fn from(model: &LoadedModel) -> Self {
        Self {
            loaded_at: model.loaded_at,
            framework: model.metadata.framework,
            version: model.metadata.version.clone(),
        }
    }
}

/// Key-value store key of the loaded marker for `model_id`
pub fn loaded_marker_key(model_id: &str) -> String {
    format!("model:loaded:{}", model_id)
}
