//! Dense feed-forward networks backing the tensor-graph and tensor-eager frameworks

use super::{InferenceBackend, RawOutput};
use serde::{Deserialize, Serialize};
use serve_core::{Error, FeatureVector, Framework, Result, TaskKind};

/// Activation applied to a layer's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(&self, values: &mut Vec<f64>) {
        match self {
            Activation::Identity => {}
            Activation::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Sigmoid => values.iter_mut().for_each(|v| *v = sigmoid(*v)),
            Activation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Activation::Softmax => *values = super::softmax(values),
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fully connected layer; `weights` is `outputs x inputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

/// Stack of dense layers evaluated in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Check that every layer's shape chains into the next
    pub fn validate(&self) -> Result<()> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| Error::decode("network has no layers"))?;
        let mut width = first
            .weights
            .first()
            .map(|row| row.len())
            .ok_or_else(|| Error::decode("layer 0 has no weights"))?;

        if width == 0 {
            return Err(Error::decode("layer 0 has zero inputs"));
        }

        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() {
                return Err(Error::decode(format!("layer {} has no weights", idx)));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                return Err(Error::decode(format!(
                    "layer {} expects {} inputs but a weight row has {}",
                    idx,
                    width,
                    row.len()
                )));
            }
            if layer.bias.len() != layer.weights.len() {
                return Err(Error::decode(format!(
                    "layer {} has {} outputs but {} biases",
                    idx,
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            width = layer.weights.len();
        }

        Ok(())
    }

    pub fn input_width(&self) -> usize {
        self.layers
            .first()
            .and_then(|layer| layer.weights.first())
            .map_or(0, |row| row.len())
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.weights.len())
    }

    /// Evaluate the network on one input row
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_width() {
            return Err(Error::inference(format!(
                "network expects {} inputs, got {}",
                self.input_width(),
                input.len()
            )));
        }

        let mut current = input.to_vec();
        for layer in &self.layers {
            let mut next: Vec<f64> = layer
                .weights
                .iter()
                .zip(&layer.bias)
                .map(|(row, bias)| row.iter().zip(&current).map(|(w, x)| w * x).sum::<f64>() + bias)
                .collect();
            layer.activation.apply(&mut next);
            current = next;
        }

        Ok(current)
    }

    fn raw_output(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput> {
        let output = self.forward(input.as_slice())?;
        match task {
            TaskKind::Classification => Ok(RawOutput::Scores(output)),
            TaskKind::Regression => match output.as_slice() {
                [value] => Ok(RawOutput::Scalar(*value)),
                _ => Err(Error::inference(format!(
                    "regression network must emit one value, emitted {}",
                    output.len()
                ))),
            },
        }
    }
}

/// Static graph model; its last layer is expected to emit probabilities
#[derive(Debug, Clone)]
pub struct GraphModel {
    network: DenseNetwork,
}

impl GraphModel {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let network: DenseNetwork = serde_json::from_slice(bytes)
            .map_err(|e| Error::decode(format!("invalid tensor-graph artifact: {}", e)))?;
        network.validate()?;
        Ok(Self { network })
    }
}

impl InferenceBackend for GraphModel {
    fn framework(&self) -> Framework {
        Framework::TensorGraph
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.network.input_width())
    }

    fn infer(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput> {
        self.network.raw_output(input, task)
    }
}

/// Eagerly executed model; classification output is raw logits
#[derive(Debug, Clone)]
pub struct EagerModel {
    network: DenseNetwork,
}

impl EagerModel {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let network: DenseNetwork = serde_json::from_slice(bytes)
            .map_err(|e| Error::decode(format!("invalid tensor-eager artifact: {}", e)))?;
        network.validate()?;
        Ok(Self { network })
    }
}

impl InferenceBackend for EagerModel {
    fn framework(&self) -> Framework {
        Framework::TensorEager
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.network.input_width())
    }

    fn infer(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput> {
        self.network.raw_output(input, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer() -> DenseNetwork {
        DenseNetwork {
            layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0, -1.0], vec![0.5, 0.5]],
                    bias: vec![0.0, 1.0],
                    activation: Activation::Relu,
                },
                DenseLayer {
                    weights: vec![vec![2.0, 1.0]],
                    bias: vec![-1.0],
                    activation: Activation::Identity,
                },
            ],
        }
    }

    #[test]
    fn test_forward_pass() {
        let network = two_layer();
        network.validate().unwrap();
        // hidden = relu([3 - 1, 1.5 + 0.5 + 1]) = [2, 3]; out = 4 + 3 - 1
        assert_eq!(network.forward(&[3.0, 1.0]).unwrap(), vec![6.0]);
        // hidden = relu([-2, 3]) = [0, 3]; out = 0 + 3 - 1
        assert_eq!(network.forward(&[1.0, 3.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_input_width_mismatch() {
        let err = two_layer().forward(&[1.0]).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_validate_rejects_broken_shapes() {
        let mut network = two_layer();
        network.layers[1].weights = vec![vec![1.0, 1.0, 1.0]];
        assert!(matches!(network.validate(), Err(Error::Decode(_))));

        let mut network = two_layer();
        network.layers[0].bias = vec![0.0];
        assert!(matches!(network.validate(), Err(Error::Decode(_))));

        let empty = DenseNetwork { layers: vec![] };
        assert!(matches!(empty.validate(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_graph_model_decode() {
        let bytes = serde_json::to_vec(&two_layer()).unwrap();
        let model = GraphModel::decode(&bytes).unwrap();
        assert_eq!(model.input_width(), Some(2));

        let output = model
            .infer(&FeatureVector::new(vec![3.0, 1.0]), TaskKind::Regression)
            .unwrap();
        assert_eq!(output, RawOutput::Scalar(6.0));

        assert!(matches!(GraphModel::decode(b"not json"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_regression_requires_single_output() {
        let network = DenseNetwork {
            layers: vec![DenseLayer {
                weights: vec![vec![1.0], vec![2.0]],
                bias: vec![0.0, 0.0],
                activation: Activation::Identity,
            }],
        };
        let model = EagerModel { network };
        let err = model
            .infer(&FeatureVector::new(vec![1.0]), TaskKind::Regression)
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_activation_from_json() {
        let layer: DenseLayer =
            serde_json::from_str(r#"{"weights": [[1.0]], "bias": [0.0]}"#).unwrap();
        assert_eq!(layer.activation, Activation::Identity);

        let layer: DenseLayer = serde_json::from_str(
            r#"{"weights": [[1.0]], "bias": [0.0], "activation": "softmax"}"#,
        )
        .unwrap();
        assert_eq!(layer.activation, Activation::Softmax);
    }
}
