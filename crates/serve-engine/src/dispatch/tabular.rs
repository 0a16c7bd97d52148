//! Classical tabular estimators: linear models and decision tree ensembles

use super::network::sigmoid;
use super::{InferenceBackend, RawOutput};
use serde::{Deserialize, Serialize};
use serve_core::{Error, FeatureVector, Framework, Result, TaskKind};

/// Estimator artifact, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabularEstimator {
    /// Ordinary linear regression
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// Logistic regression; one coefficient row is binary, more rows are multinomial
    Logistic {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// Averaged decision trees; leaves hold a class distribution or a single value
    TreeEnsemble {
        n_features: usize,
        trees: Vec<DecisionTree>,
    },
}

/// Flat decision tree rooted at `nodes[0]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `x[feature] <= threshold`, else `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

impl DecisionTree {
    /// Children must point forward, which rules out cycles
    fn validate(&self, n_features: usize) -> Result<usize> {
        let mut leaf_width = None;
        if self.nodes.is_empty() {
            return Err(Error::decode("decision tree has no nodes"));
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(Error::decode(format!(
                            "node {} splits on feature {} of {}",
                            idx, feature, n_features
                        )));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(Error::decode(format!(
                                "node {} has invalid child {}",
                                idx, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => match leaf_width {
                    None if value.is_empty() => {
                        return Err(Error::decode(format!("leaf {} is empty", idx)))
                    }
                    None => leaf_width = Some(value.len()),
                    Some(width) if width != value.len() => {
                        return Err(Error::decode(format!(
                            "leaf {} has width {}, expected {}",
                            idx,
                            value.len(),
                            width
                        )))
                    }
                    Some(_) => {}
                },
            }
        }

        leaf_width.ok_or_else(|| Error::decode("decision tree has no leaves"))
    }

    fn evaluate(&self, input: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if input[*feature] <= *threshold { *left } else { *right },
                TreeNode::Leaf { value } => return value,
            }
        }
    }
}

impl TabularEstimator {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let estimator: TabularEstimator = serde_json::from_slice(bytes)
            .map_err(|e| Error::decode(format!("invalid tabular-estimator artifact: {}", e)))?;
        estimator.validate()?;
        Ok(estimator)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TabularEstimator::Linear { coefficients, .. } => {
                if coefficients.is_empty() {
                    return Err(Error::decode("linear estimator has no coefficients"));
                }
            }
            TabularEstimator::Logistic {
                coefficients,
                intercepts,
            } => {
                let width = coefficients
                    .first()
                    .map(|row| row.len())
                    .ok_or_else(|| Error::decode("logistic estimator has no coefficients"))?;
                if width == 0 || coefficients.iter().any(|row| row.len() != width) {
                    return Err(Error::decode("logistic coefficient rows differ in width"));
                }
                if intercepts.len() != coefficients.len() {
                    return Err(Error::decode(format!(
                        "logistic estimator has {} coefficient rows but {} intercepts",
                        coefficients.len(),
                        intercepts.len()
                    )));
                }
            }
            TabularEstimator::TreeEnsemble { n_features, trees } => {
                if trees.is_empty() {
                    return Err(Error::decode("tree ensemble has no trees"));
                }
                let mut width = None;
                for tree in trees {
                    let leaf_width = tree.validate(*n_features)?;
                    if *width.get_or_insert(leaf_width) != leaf_width {
                        return Err(Error::decode("trees disagree on leaf width"));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn input_width(&self) -> usize {
        match self {
            TabularEstimator::Linear { coefficients, .. } => coefficients.len(),
            TabularEstimator::Logistic { coefficients, .. } => {
                coefficients.first().map_or(0, |row| row.len())
            }
            TabularEstimator::TreeEnsemble { n_features, .. } => *n_features,
        }
    }

    pub fn predict(&self, input: &[f64], task: TaskKind) -> Result<RawOutput> {
        if input.len() != self.input_width() {
            return Err(Error::inference(format!(
                "estimator expects {} inputs, got {}",
                self.input_width(),
                input.len()
            )));
        }

        match (self, task) {
            (
                TabularEstimator::Linear {
                    coefficients,
                    intercept,
                },
                TaskKind::Regression,
            ) => Ok(RawOutput::Scalar(dot(coefficients, input) + intercept)),
            (TabularEstimator::Linear { .. }, TaskKind::Classification) => Err(Error::inference(
                "linear estimator does not produce class probabilities",
            )),
            (
                TabularEstimator::Logistic {
                    coefficients,
                    intercepts,
                },
                TaskKind::Classification,
            ) => {
                let logits: Vec<f64> = coefficients
                    .iter()
                    .zip(intercepts)
                    .map(|(row, b)| dot(row, input) + b)
                    .collect();
                let probabilities = match logits.as_slice() {
                    [z] => {
                        let p = sigmoid(*z);
                        vec![1.0 - p, p]
                    }
                    _ => super::softmax(&logits),
                };
                Ok(RawOutput::Scores(probabilities))
            }
            (TabularEstimator::Logistic { .. }, TaskKind::Regression) => Err(Error::inference(
                "logistic estimator cannot serve a regression task",
            )),
            (TabularEstimator::TreeEnsemble { trees, .. }, task) => {
                let mut sum: Vec<f64> = Vec::new();
                for tree in trees {
                    let leaf = tree.evaluate(input);
                    if sum.is_empty() {
                        sum = leaf.to_vec();
                    } else {
                        sum.iter_mut().zip(leaf).for_each(|(acc, v)| *acc += v);
                    }
                }
                let n = trees.len() as f64;
                sum.iter_mut().for_each(|v| *v /= n);

                match (task, sum.as_slice()) {
                    (TaskKind::Classification, _) => Ok(RawOutput::Scores(sum)),
                    (TaskKind::Regression, [value]) => Ok(RawOutput::Scalar(*value)),
                    (TaskKind::Regression, _) => Err(Error::inference(format!(
                        "regression trees must have single-value leaves, found width {}",
                        sum.len()
                    ))),
                }
            }
        }
    }
}

fn dot(weights: &[f64], input: &[f64]) -> f64 {
    weights.iter().zip(input).map(|(w, x)| w * x).sum()
}

impl InferenceBackend for TabularEstimator {
    fn framework(&self) -> Framework {
        Framework::TabularEstimator
    }

    fn input_width(&self) -> Option<usize> {
        Some(TabularEstimator::input_width(self))
    }

    fn infer(&self, input: &FeatureVector, task: TaskKind) -> Result<RawOutput> {
        self.predict(input.as_slice(), task)
    }
}
