//! Self-describing serialized models
//!
//! A generic artifact wraps one of the concrete model kinds in an envelope that
//! names the kind, so the framework tag alone does not fix the representation.

use super::network::DenseNetwork;
use super::tabular::TabularEstimator;
use super::{InferenceBackend, RawOutput};
use serde::{Deserialize, Serialize};
use serve_core::{Error, FeatureVector, Framework, Result, TaskKind};

/// Envelope versions this build can read
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericArtifact {
    pub format_version: u32,
    pub payload: GenericPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "model", rename_all = "snake_case")]
pub enum GenericPayload {
    /// Network whose output is used as-is
    Network(DenseNetwork),
    Estimator(TabularEstimator),
}

impl GenericArtifact {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let artifact: GenericArtifact = serde_json::from_slice(bytes)
            .map_err(|e| Error::decode(format!("invalid generic-serialized artifact: {}", e)))?;

        if artifact.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(Error::decode(format!(
                "unsupported envelope version {}",
                artifact.format_version
            )));
        }

        match &artifact.payload {
            GenericPayload::Network(network) => network.validate()?,
            GenericPayload::Estimator(estimator) => estimator.validate()?,
        }

        Ok(artifact)
    }
}

impl InferenceBackend for GenericArtifact {
    fn framework(&self) -> Framework {
        Framework::GenericSerialized
    }

    fn input_width(&self) -> Option<usize> {
        match &self.payload {
            GenericPayload::Network(network) => Some(network.input_width()),
            GenericPayload::Estimator(estimator) => Some(estimator.input_width()),
        }
    }

    fn infer(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput> {
        match &self.payload {
            GenericPayload::Network(network) => {
                let output = network.forward(input.as_slice())?;
                match (task, output.as_slice()) {
                    (TaskKind::Classification, _) => Ok(RawOutput::Scores(output)),
                    (TaskKind::Regression, [value]) => Ok(RawOutput::Scalar(*value)),
                    (TaskKind::Regression, _) => Err(Error::inference(format!(
                        "regression network must emit one value, emitted {}",
                        output.len()
                    ))),
                }
            }
            GenericPayload::Estimator(estimator) => estimator.predict(input.as_slice(), task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_estimator_envelope() {
        let json = br#"{
            "format_version": 1,
            "payload": {
                "type": "estimator",
                "model": {"kind": "linear", "coefficients": [0.5], "intercept": 1.0}
            }
        }"#;

        let artifact = GenericArtifact::decode(json).unwrap();
        assert_eq!(artifact.input_width(), Some(1));
        assert_eq!(
            artifact
                .infer(&FeatureVector::new(vec![4.0]), TaskKind::Regression)
                .unwrap(),
            RawOutput::Scalar(3.0)
        );
    }

    #[test]
    fn test_decode_network_envelope() {
        let json = br#"{
            "format_version": 1,
            "payload": {
                "type": "network",
                "model": {"layers": [{"weights": [[1.0], [-1.0]], "bias": [0.0, 0.0], "activation": "softmax"}]}
            }
        }"#;

        let artifact = GenericArtifact::decode(json).unwrap();
        match artifact
            .infer(&FeatureVector::new(vec![0.0]), TaskKind::Classification)
            .unwrap()
        {
            RawOutput::Scores(p) => assert_eq!(p, vec![0.5, 0.5]),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = br#"{
            "format_version": 7,
            "payload": {"type": "estimator", "model": {"kind": "linear", "coefficients": [1.0], "intercept": 0.0}}
        }"#;
        assert!(matches!(GenericArtifact::decode(json), Err(Error::Decode(_))));
    }
}
