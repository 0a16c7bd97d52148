//! Ready-made models for tests and local experiments
//!
//! Each fixture bundles metadata with a matching serialized artifact and the
//! `bucket/key` path it is published under.

use crate::fs::FileModelRegistry;
use crate::mock_stores::{MockArtifactStore, MockModelRegistry};
use bytes::Bytes;
use serde_json::json;
use serve_core::{CategoricalEncoder, Framework, ModelMetadata, Result, TaskKind};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ModelFixture {
    pub metadata: ModelMetadata,
    pub artifact: Bytes,
    pub artifact_path: String,
}

impl ModelFixture {
    fn new(metadata: ModelMetadata, artifact: serde_json::Value) -> Self {
        let artifact_path = format!("models/{}/model.json", metadata.model_id);
        Self {
            metadata,
            artifact: Bytes::from(artifact.to_string()),
            artifact_path,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.metadata.model_id
    }

    /// Publish the artifact and register the metadata with mock collaborators
    pub async fn install(
        &self,
        artifacts: &MockArtifactStore,
        registry: &MockModelRegistry,
    ) -> Result<()> {
        artifacts
            .insert(&self.artifact_path, self.artifact.clone())
            .await?;
        registry.register(self.metadata.clone()).await;
        Ok(())
    }

    /// Write the artifact under `artifact_root` and the metadata into `registry`
    pub async fn write_to(&self, artifact_root: &Path, registry: &FileModelRegistry) -> Result<()> {
        let file = artifact_root.join(&self.artifact_path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, &self.artifact).await?;
        registry.save(&self.metadata).await?;
        Ok(())
    }
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// `y = 2a + b + 0.5` with `b` defaulting to 0
pub fn linear_regression(model_id: &str) -> ModelFixture {
    let metadata = ModelMetadata::new(
        model_id,
        Framework::TabularEstimator,
        TaskKind::Regression,
        names(&["a", "b"]),
    )
    .with_default("b", 0.0);

    ModelFixture::new(
        metadata,
        json!({"kind": "linear", "coefficients": [2.0, 1.0], "intercept": 0.5}),
    )
}

/// Binary logistic model over a numeric `usage` and a categorical `plan`
pub fn churn_classifier(model_id: &str) -> ModelFixture {
    let metadata = ModelMetadata::new(
        model_id,
        Framework::TabularEstimator,
        TaskKind::Classification,
        names(&["usage", "plan"]),
    )
    .with_encoder("plan", CategoricalEncoder::new(["free", "team", "enterprise"]))
    .with_default("plan", "free")
    .with_version("2.1.0");

    ModelFixture::new(
        metadata,
        json!({"kind": "logistic", "coefficients": [[-1.0, -0.5]], "intercepts": [0.5]}),
    )
}

/// Eager network emitting its two inputs as raw logits
pub fn eager_classifier(model_id: &str) -> ModelFixture {
    let metadata = ModelMetadata::new(
        model_id,
        Framework::TensorEager,
        TaskKind::Classification,
        names(&["x0", "x1"]),
    );

    ModelFixture::new(
        metadata,
        json!({"layers": [{"weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0]}]}),
    )
}

/// Graph network ending in a softmax over three classes
pub fn graph_classifier(model_id: &str) -> ModelFixture {
    let metadata = ModelMetadata::new(
        model_id,
        Framework::TensorGraph,
        TaskKind::Classification,
        names(&["x0", "x1"]),
    );

    ModelFixture::new(
        metadata,
        json!({"layers": [
            {"weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0], "activation": "relu"},
            {"weights": [[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]], "bias": [0.0, 0.0, 0.0], "activation": "softmax"}
        ]}),
    )
}

/// Generic envelope around a single regression tree over `sqft`
pub fn generic_tree_regressor(model_id: &str) -> ModelFixture {
    let metadata = ModelMetadata::new(
        model_id,
        Framework::GenericSerialized,
        TaskKind::Regression,
        names(&["sqft"]),
    );

    ModelFixture::new(
        metadata,
        json!({
            "format_version": 1,
            "payload": {
                "type": "estimator",
                "model": {
                    "kind": "tree_ensemble",
                    "n_features": 1,
                    "trees": [{"nodes": [
                        {"type": "split", "feature": 0, "threshold": 1000.0, "left": 1, "right": 2},
                        {"type": "leaf", "value": [150000.0]},
                        {"type": "leaf", "value": [320000.0]}
                    ]}]
                }
            }
        }),
    )
}

/// One fixture per framework
pub fn all_fixtures() -> Vec<ModelFixture> {
    vec![
        linear_regression("price-linear"),
        churn_classifier("churn"),
        eager_classifier("eager"),
        graph_classifier("graph"),
        generic_tree_regressor("price-tree"),
    ]
}
