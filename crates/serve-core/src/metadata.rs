//! Model metadata supplied by the registry at load time

use crate::types::{FeatureValue, Framework, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Everything the serving engine needs to know about a model besides its weights.
///
/// `feature_names` fixes the positional layout of the model input. It must match
/// the order the model was trained and serialized with and is never inferred from
/// a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Stable model identifier, independent of version
    pub model_id: String,

    /// Inference framework the artifact was produced by
    pub framework: Framework,

    /// Classification or regression
    pub task: TaskKind,

    /// Ordered input feature names
    pub feature_names: Vec<String>,

    /// Fallback values for features absent from a request
    #[serde(default)]
    pub feature_defaults: HashMap<String, FeatureValue>,

    /// Features whose values are categories rather than numbers
    #[serde(default)]
    pub categorical_features: HashSet<String>,

    /// Encoders for categorical features, keyed by feature name
    #[serde(default)]
    pub encoders: HashMap<String, CategoricalEncoder>,

    /// Semantic version of the model
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ModelMetadata {
    /// Create metadata with required fields
    pub fn new(
        model_id: impl Into<String>,
        framework: Framework,
        task: TaskKind,
        feature_names: Vec<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            framework,
            task,
            feature_names,
            feature_defaults: HashMap::new(),
            categorical_features: HashSet::new(),
            encoders: HashMap::new(),
            version: default_version(),
        }
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.feature_defaults.insert(name.into(), value.into());
        self
    }

    /// Mark a feature categorical and attach its encoder
    pub fn with_encoder(mut self, name: impl Into<String>, encoder: CategoricalEncoder) -> Self {
        let name = name.into();
        self.categorical_features.insert(name.clone());
        self.encoders.insert(name, encoder);
        self
    }

    pub fn with_categorical(mut self, name: impl Into<String>) -> Self {
        self.categorical_features.insert(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Check internal consistency of the metadata
    pub fn validate(&self) -> crate::Result<()> {
        if self.model_id.is_empty() {
            return Err(crate::Error::invalid_request("model id cannot be empty"));
        }

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(crate::Error::invalid_request(format!(
                    "duplicate feature name '{}' in metadata for {}",
                    name, self.model_id
                )));
            }
        }

        for name in self.encoders.keys() {
            if !self.categorical_features.contains(name) {
                return Err(crate::Error::invalid_request(format!(
                    "encoder registered for non-categorical feature '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Parse a JSON metadata document
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Self::from_document(serde_json::from_str(raw)?)
    }

    /// Parse a YAML metadata document
    pub fn from_yaml(raw: &str) -> crate::Result<Self> {
        Self::from_document(serde_yaml::from_str(raw)?)
    }

    /// Deserialize a metadata document.
    ///
    /// The framework tag is checked first so an unknown framework surfaces as
    /// `Error::UnsupportedFramework` rather than a serialization error.
    pub fn from_document(document: serde_json::Value) -> crate::Result<Self> {
        if let Some(tag) = document.get("framework").and_then(|v| v.as_str()) {
            tag.parse::<Framework>()?;
        }
        Ok(serde_json::from_value(document)?)
    }
}

/// Label encoder mapping a category to its index in `classes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    /// Known categories; a category encodes to its position
    pub classes: Vec<String>,

    /// Value used for categories not seen at training time
    #[serde(default)]
    pub unknown_value: Option<f64>,
}

impl CategoricalEncoder {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            unknown_value: None,
        }
    }

    pub fn with_unknown_value(mut self, value: f64) -> Self {
        self.unknown_value = Some(value);
        self
    }

    /// Encode a category, or `None` if it is unknown and no fallback is set
    pub fn encode(&self, category: &str) -> Option<f64> {
        self.classes
            .iter()
            .position(|c| c == category)
            .map(|idx| idx as f64)
            .or(self.unknown_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ModelMetadata::new(
            "churn",
            Framework::TabularEstimator,
            TaskKind::Classification,
            names(&["tenure", "plan"]),
        )
        .with_default("tenure", 0.0)
        .with_encoder("plan", CategoricalEncoder::new(["basic", "pro"]))
        .with_version("2.1.0");

        assert!(metadata.validate().is_ok());
        assert!(metadata.categorical_features.contains("plan"));
        assert_eq!(metadata.version, "2.1.0");
        assert_eq!(metadata.feature_defaults["tenure"], FeatureValue::Number(0.0));
    }

    #[test]
    fn test_metadata_validation() {
        let duplicated = ModelMetadata::new(
            "m",
            Framework::TensorGraph,
            TaskKind::Regression,
            names(&["a", "a"]),
        );
        assert!(duplicated.validate().is_err());

        let mut stray_encoder =
            ModelMetadata::new("m", Framework::TensorGraph, TaskKind::Regression, names(&["a"]));
        stray_encoder
            .encoders
            .insert("a".to_string(), CategoricalEncoder::new(["x"]));
        assert!(stray_encoder.validate().is_err());
    }

    #[test]
    fn test_metadata_from_json() {
        let json = r#"{
            "model_id": "fraud",
            "framework": "sklearn",
            "task": "classification",
            "feature_names": ["amount", "country"],
            "feature_defaults": {"amount": 0},
            "categorical_features": ["country"],
            "encoders": {"country": {"classes": ["NL", "DE"], "unknown_value": -1}}
        }"#;

        let metadata: ModelMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.framework, Framework::TabularEstimator);
        assert_eq!(metadata.version, "1.0");
        assert_eq!(metadata.encoders["country"].encode("DE"), Some(1.0));
        assert_eq!(metadata.encoders["country"].encode("FR"), Some(-1.0));
    }

    #[test]
    fn test_unknown_framework_tag() {
        let json = r#"{"model_id": "m", "framework": "onnx", "task": "regression", "feature_names": ["a"]}"#;
        assert_eq!(
            ModelMetadata::from_json(json).unwrap_err(),
            crate::Error::UnsupportedFramework("onnx".to_string())
        );

        let yaml = "model_id: m\nframework: xgboost\ntask: regression\nfeature_names: [a]\n";
        assert!(matches!(
            ModelMetadata::from_yaml(yaml),
            Err(crate::Error::UnsupportedFramework(_))
        ));

        let yaml = "model_id: m\nframework: PyTorch\ntask: classification\nfeature_names: [a]\n";
        assert_eq!(
            ModelMetadata::from_yaml(yaml).unwrap().framework,
            Framework::TensorEager
        );
    }

    #[test]
    fn test_encoder_unknown_category() {
        let encoder = CategoricalEncoder::new(["low", "mid", "high"]);
        assert_eq!(encoder.encode("high"), Some(2.0));
        assert_eq!(encoder.encode("extreme"), None);
    }
}
