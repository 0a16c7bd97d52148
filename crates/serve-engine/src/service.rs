//! Request-level prediction path
//!
//! Merges cached entity features with the features carried by the request and
//! hands the result to the model cache.

use crate::cache::ModelCacheManager;
use crate::feature_store::FeatureStoreClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serve_core::{FeatureMap, PredictionResult, Result};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub model_id: String,

    #[serde(default)]
    pub features: FeatureMap,

    /// Stored features to look up for `entity_id`
    #[serde(default)]
    pub feature_ids: Vec<String>,

    #[serde(default)]
    pub entity_id: Option<String>,

    #[serde(default)]
    pub request_id: Option<String>,
}

impl PredictionRequest {
    pub fn new(model_id: impl Into<String>, features: FeatureMap) -> Self {
        Self {
            model_id: model_id.into(),
            features,
            feature_ids: Vec::new(),
            entity_id: None,
            request_id: None,
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>, feature_ids: Vec<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self.feature_ids = feature_ids;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction_id: Uuid,
    pub request_id: Option<String>,
    pub model_id: String,
    pub result: PredictionResult,
    /// End-to-end time including the feature lookup
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one item of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Success(PredictionResponse),
    Failed {
        request_id: Option<String>,
        model_id: String,
        error: String,
    },
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchItem::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub predictions: Vec<BatchItem>,
    pub total: usize,
}

/// Serves prediction requests on top of the cache and feature store
#[derive(Debug, Clone)]
pub struct PredictionService {
    cache: ModelCacheManager,
    features: FeatureStoreClient,
}

impl PredictionService {
    pub fn new(cache: ModelCacheManager, features: FeatureStoreClient) -> Self {
        Self { cache, features }
    }

    pub fn cache(&self) -> &ModelCacheManager {
        &self.cache
    }

    pub fn feature_store(&self) -> &FeatureStoreClient {
        &self.features
    }

    /// Features for `request`: stored entity features overlaid by the request's own
    pub async fn resolve_features(&self, request: &PredictionRequest) -> Result<FeatureMap> {
        let mut merged = match &request.entity_id {
            Some(entity_id) if !request.feature_ids.is_empty() => {
                self.features
                    .get(entity_id, Some(request.feature_ids.as_slice()))
                    .await?
            }
            _ => FeatureMap::new(),
        };

        let stored = merged.len();
        merged.extend(
            request
                .features
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        debug!(
            "Resolved {} features for {} ({} from store)",
            merged.len(),
            request.model_id,
            stored
        );
        Ok(merged)
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let started = Instant::now();
        let features = self.resolve_features(request).await?;
        let result = self.cache.predict(&request.model_id, &features).await?;

        Ok(PredictionResponse {
            prediction_id: Uuid::new_v4(),
            request_id: request.request_id.clone(),
            model_id: request.model_id.clone(),
            result,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        })
    }

    /// Predict every request in order; a failing item does not stop the batch
    pub async fn predict_batch(&self, requests: &[PredictionRequest]) -> BatchResponse {
        let mut predictions = Vec::with_capacity(requests.len());

        for request in requests {
            let item = match self.predict(request).await {
                Ok(response) => BatchItem::Success(response),
                Err(e) => {
                    warn!("Batch prediction for {} failed: {}", request.model_id, e);
                    BatchItem::Failed {
                        request_id: request.request_id.clone(),
                        model_id: request.model_id.clone(),
                        error: e.to_string(),
                    }
                }
            };
            predictions.push(item);
        }

        BatchResponse {
            total: requests.len(),
            predictions,
        }
    }
}
