//! Core type definitions for modelserve

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named feature values as supplied by a caller or the feature store
pub type FeatureMap = HashMap<String, FeatureValue>;

/// Inference frameworks a loaded model can require.
///
/// The set is closed: adding a framework means adding a variant here, and every
/// `match` over it is exhaustive so the compiler points at each place that needs
/// a new arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Framework {
    /// Static computation graph that emits class probabilities
    #[serde(rename = "tensor-graph")]
    TensorGraph,
    /// Eagerly executed network that emits raw logits
    #[serde(rename = "tensor-eager")]
    TensorEager,
    /// Classical tabular estimator (linear models, tree ensembles)
    #[serde(rename = "tabular-estimator")]
    TabularEstimator,
    /// Self-describing serialized model envelope
    #[serde(rename = "generic-serialized")]
    GenericSerialized,
}

impl Framework {
    /// All known frameworks
    pub const ALL: [Framework; 4] = [
        Framework::TensorGraph,
        Framework::TensorEager,
        Framework::TabularEstimator,
        Framework::GenericSerialized,
    ];

    /// Canonical tag for this framework
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::TensorGraph => "tensor-graph",
            Framework::TensorEager => "tensor-eager",
            Framework::TabularEstimator => "tabular-estimator",
            Framework::GenericSerialized => "generic-serialized",
        }
    }
}

impl std::str::FromStr for Framework {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tensor-graph" | "tensorflow" => Ok(Framework::TensorGraph),
            "tensor-eager" | "pytorch" => Ok(Framework::TensorEager),
            "tabular-estimator" | "sklearn" => Ok(Framework::TabularEstimator),
            "generic-serialized" | "pickle" => Ok(Framework::GenericSerialized),
            _ => Err(crate::Error::unsupported_framework(s)),
        }
    }
}

// Tags are read through `FromStr` so aliases and case match the parser
impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classification" => Ok(TaskKind::Classification),
            "regression" => Ok(TaskKind::Regression),
            _ => Err(format!("Unknown task kind: {}", s)),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Classification => write!(f, "classification"),
            TaskKind::Regression => write!(f, "regression"),
        }
    }
}

/// Location of a model artifact in object storage, `bucket/object-key`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactPath {
    pub bucket: String,
    pub key: String,
}

impl ArtifactPath {
    /// Create a path from its parts
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `bucket/object-key`; the key may itself contain slashes
    pub fn parse(path: &str) -> crate::Result<Self> {
        match path.trim_start_matches('/').split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(crate::Error::download(format!(
                "invalid artifact path '{}', expected bucket/object-key",
                path
            ))),
        }
    }

    /// Last path segment of the object key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A single named feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FeatureValue {
    /// Numeric view of the value, if it has one without encoding
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Category label used when the value feeds a categorical encoder
    pub fn category_label(&self) -> String {
        match self {
            FeatureValue::Number(n) => n.to_string(),
            FeatureValue::Bool(b) => b.to_string(),
            FeatureValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// Positionally ordered model input; index `i` corresponds to `feature_names[i]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl std::ops::Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}
