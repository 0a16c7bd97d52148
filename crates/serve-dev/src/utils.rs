//! Utility functions for development and testing

use rand::seq::SliceRandom;
use rand::Rng;
use serve_core::{FeatureMap, FeatureValue, ModelMetadata, ServeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Setup test logging with appropriate levels
pub fn setup_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serve_dev=debug,serve_core=debug,serve_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Configuration with short deadlines, suited to tests
pub fn create_test_config() -> ServeConfig {
    let mut config = ServeConfig::default();
    config.engine.registry_timeout_ms = 1_000;
    config.engine.fetch_timeout_ms = 1_000;
    config.engine.store_timeout_ms = 500;
    config.metrics.store_timeout_ms = 500;
    config.feature_store.store_timeout_ms = 500;
    config.logging.level = "debug".to_string();
    config
}

/// Random inputs for exercising loaded models
#[derive(Debug)]
pub struct TestDataGenerator {
    rng: rand::rngs::ThreadRng,
}

impl TestDataGenerator {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    pub fn random_model_id(&mut self) -> String {
        let prefixes = ["churn", "fraud", "price", "ltv", "ranker"];
        let prefix = prefixes.choose(&mut self.rng).copied().unwrap_or("model");
        format!("{}-{:04x}", prefix, self.rng.gen::<u16>())
    }

    pub fn random_entity_id(&mut self) -> String {
        format!("user-{}", self.rng.gen_range(1..100_000))
    }

    /// A value for every feature of `metadata`.
    ///
    /// Categorical features with an encoder get one of the known categories;
    /// everything else gets a number in `[0, 100)`.
    pub fn random_features(&mut self, metadata: &ModelMetadata) -> FeatureMap {
        metadata
            .feature_names
            .iter()
            .map(|name| {
                let known = metadata
                    .encoders
                    .get(name)
                    .and_then(|encoder| encoder.classes.choose(&mut self.rng));
                let value = match known {
                    Some(category) => FeatureValue::Text(category.clone()),
                    None => FeatureValue::Number(self.rng.gen_range(0.0..100.0)),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Like [`random_features`](Self::random_features) but leaves out `missing` names
    pub fn partial_features(&mut self, metadata: &ModelMetadata, missing: &[&str]) -> FeatureMap {
        let mut features = self.random_features(metadata);
        features.retain(|name, _| !missing.contains(&name.as_str()));
        features
    }
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn generate_test_data() -> TestDataGenerator {
    TestDataGenerator::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::churn_classifier;

    #[test]
    fn test_setup_test_logging() {
        // Should not panic, even when called twice
        setup_test_logging();
        setup_test_logging();
    }

    #[test]
    fn test_create_test_config_is_valid() {
        let config = create_test_config();
        config.validate().unwrap();
        assert_eq!(config.engine.fetch_timeout_ms, 1_000);
    }

    #[test]
    fn test_random_features_respect_encoders() {
        let fixture = churn_classifier("churn");
        let mut generator = TestDataGenerator::new();

        for _ in 0..20 {
            let features = generator.random_features(&fixture.metadata);
            assert_eq!(features.len(), 2);
            match &features["plan"] {
                FeatureValue::Text(plan) => {
                    assert!(["free", "team", "enterprise"].contains(&plan.as_str()))
                }
                other => panic!("plan should be categorical, got {:?}", other),
            }
            assert!(features["usage"].as_f64().is_some());
        }

        let partial = generator.partial_features(&fixture.metadata, &["plan"]);
        assert!(!partial.contains_key("plan"));
    }

    #[test]
    fn test_random_ids() {
        let mut generator = generate_test_data();
        assert!(!generator.random_model_id().is_empty());
        assert!(generator.random_entity_id().starts_with("user-"));
    }
}
