//! Prediction results and per-model performance statistics

use crate::types::Framework;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized outcome of a single predict call.
///
/// Exactly one of `{predicted_class, probabilities, confidence}` or
/// `{predicted_value}` is populated, depending on the model's task kind. Use the
/// constructors to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub model_id: String,
    pub predicted_class: Option<usize>,
    pub predicted_value: Option<f64>,
    /// Per-class probabilities, in class index order
    pub probabilities: Option<Vec<f64>>,
    /// Maximum probability for classification
    pub confidence: Option<f64>,
    /// Wall-clock time of the inference call only
    pub latency_ms: f64,
    pub framework: Framework,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

impl PredictionResult {
    /// Classification result from a normalized probability vector.
    ///
    /// Class is the argmax and confidence the max; the first maximum wins on ties.
    /// Returns `None` for an empty vector.
    pub fn classification(
        model_id: impl Into<String>,
        framework: Framework,
        model_version: impl Into<String>,
        probabilities: Vec<f64>,
        latency_ms: f64,
    ) -> Option<Self> {
        let (class, confidence) = argmax(&probabilities)?;
        Some(Self {
            model_id: model_id.into(),
            predicted_class: Some(class),
            predicted_value: None,
            probabilities: Some(probabilities),
            confidence: Some(confidence),
            latency_ms,
            framework,
            model_version: model_version.into(),
            timestamp: Utc::now(),
        })
    }

    /// Regression result
    pub fn regression(
        model_id: impl Into<String>,
        framework: Framework,
        model_version: impl Into<String>,
        value: f64,
        latency_ms: f64,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            predicted_class: None,
            predicted_value: Some(value),
            probabilities: None,
            confidence: None,
            latency_ms,
            framework,
            model_version: model_version.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_classification(&self) -> bool {
        self.predicted_class.is_some()
    }
}

/// Index and value of the first maximum, skipping NaN
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (idx, v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((idx, v)),
        })
}

/// Series kept per model by the metrics recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Latency,
    Confidence,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Latency => write!(f, "latency"),
            MetricKind::Confidence => write!(f, "confidence"),
        }
    }
}

/// One timestamped observation in a metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
        }
    }

    /// Sort score for time-ordered storage
    pub fn score(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Aggregates over a model's recent predictions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelStats {
    pub model_id: String,
    pub total_predictions: u64,
    pub last_prediction_time: Option<DateTime<Utc>>,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub average_confidence: Option<f64>,
}
