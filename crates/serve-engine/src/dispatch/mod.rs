//! Inference dispatch over the closed set of model frameworks
//!
//! Each framework decodes its artifact into an [`InferenceBackend`]. The
//! dispatcher runs the backend and applies the per-framework score
//! normalization hook before turning raw output into a prediction.

use crate::model::LoadedModel;
use serve_core::{Error, FeatureVector, Framework, PredictionResult, Result, TaskKind};
use std::fmt;
use tracing::debug;

pub mod generic;
pub mod network;
pub mod tabular;

pub use generic::{GenericArtifact, GenericPayload};
pub use network::{Activation, DenseLayer, DenseNetwork, EagerModel, GraphModel};
pub use tabular::{DecisionTree, TabularEstimator, TreeNode};

/// Output of a backend before post-processing
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Single regression value
    Scalar(f64),
    /// Per-class scores in class index order
    Scores(Vec<f64>),
}

/// Uniform inference capability over a decoded, framework-specific model
pub trait InferenceBackend: Send + Sync + fmt::Debug {
    /// Framework the model was decoded as
    fn framework(&self) -> Framework;

    /// Number of inputs the model consumes, when the format declares it
    fn input_width(&self) -> Option<usize>;

    /// Run the model on one feature vector
    fn infer(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput>;
}

/// Decode artifact bytes into a backend for `framework`
pub fn decode_artifact(framework: Framework, bytes: &[u8]) -> Result<Box<dyn InferenceBackend>> {
    debug!("Decoding {} byte artifact as {}", bytes.len(), framework);

    match framework {
        Framework::TensorGraph => Ok(Box::new(GraphModel::decode(bytes)?)),
        Framework::TensorEager => Ok(Box::new(EagerModel::decode(bytes)?)),
        Framework::TabularEstimator => Ok(Box::new(TabularEstimator::decode(bytes)?)),
        Framework::GenericSerialized => Ok(Box::new(GenericArtifact::decode(bytes)?)),
    }
}

/// How a framework's classification scores become probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreNormalization {
    /// Scores already are probabilities
    AsIs,
    /// Scores are logits and need a softmax
    Softmax,
}

impl ScoreNormalization {
    /// Normalization hook for a framework.
    ///
    /// Only eager networks emit raw logits; graph models end in a probability
    /// layer, estimators produce class probabilities and generic envelopes
    /// are served exactly as serialized.
    pub fn for_framework(framework: Framework) -> Self {
        match framework {
            Framework::TensorEager => ScoreNormalization::Softmax,
            Framework::TensorGraph | Framework::TabularEstimator | Framework::GenericSerialized => {
                ScoreNormalization::AsIs
            }
        }
    }

    pub fn apply(&self, scores: Vec<f64>) -> Vec<f64> {
        match self {
            ScoreNormalization::AsIs => scores,
            ScoreNormalization::Softmax => softmax(&scores),
        }
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Post-processed model output, ready to be stamped with latency
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedOutput {
    Classification { probabilities: Vec<f64> },
    Regression { value: f64 },
}

impl NormalizedOutput {
    /// Build the caller-facing result
    pub fn into_result(self, model: &LoadedModel, latency_ms: f64) -> Result<PredictionResult> {
        let metadata = &model.metadata;
        match self {
            NormalizedOutput::Classification { probabilities } => PredictionResult::classification(
                &metadata.model_id,
                metadata.framework,
                &metadata.version,
                probabilities,
                latency_ms,
            )
            .ok_or_else(|| Error::inference("classifier produced no usable scores")),
            NormalizedOutput::Regression { value } => Ok(PredictionResult::regression(
                &metadata.model_id,
                metadata.framework,
                &metadata.version,
                value,
                latency_ms,
            )),
        }
    }
}

/// Executes predictions for loaded models
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceDispatcher;

impl InferenceDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run `model` on `input` and normalize its output for the model's task
    pub fn dispatch(&self, model: &LoadedModel, input: &FeatureVector) -> Result<NormalizedOutput> {
        let task = model.metadata.task;
        let framework = model.handle.framework();
        let raw = model.handle.infer(input, task)?;

        match (task, raw) {
            (TaskKind::Classification, RawOutput::Scores(scores)) => {
                if scores.is_empty() {
                    return Err(Error::inference(format!(
                        "{} model {} returned no class scores",
                        framework, model.metadata.model_id
                    )));
                }
                let probabilities = ScoreNormalization::for_framework(framework).apply(scores);
                Ok(NormalizedOutput::Classification { probabilities })
            }
            (TaskKind::Regression, RawOutput::Scalar(value)) => {
                Ok(NormalizedOutput::Regression { value })
            }
            (TaskKind::Classification, RawOutput::Scalar(_)) => Err(Error::inference(format!(
                "classification model {} returned a scalar",
                model.metadata.model_id
            ))),
            (TaskKind::Regression, RawOutput::Scores(_)) => Err(Error::inference(format!(
                "regression model {} returned class scores",
                model.metadata.model_id
            ))),
        }
    }
}
