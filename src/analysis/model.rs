// Trained classifier variants
//
// The engine only sees `Predictor`. Concrete models are a closed set loaded
// from a JSON description, plus an escape hatch for externally supplied
// implementations.

use crate::analysis::features::FeatureVector;
use crate::analysis::Severity;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Output of a trained classifier for one feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    /// Per-class probabilities; empty if the model does not provide them
    pub probabilities: BTreeMap<String, f64>,
}

impl Prediction {
    /// Build a prediction from class probabilities, picking the argmax
    ///
    /// Ties resolve to the earliest class.
    pub fn from_probabilities(classes: &[String], probabilities: &[f64]) -> Self {
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        Self {
            label: classes.get(best).cloned().unwrap_or_default(),
            confidence: probabilities.get(best).copied().unwrap_or(0.0),
            probabilities: classes
                .iter()
                .cloned()
                .zip(probabilities.iter().copied())
                .collect(),
        }
    }

    /// Maximum class probability, or the reported confidence without them
    pub fn max_probability(&self) -> f64 {
        self.probabilities
            .values()
            .copied()
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
            .unwrap_or(self.confidence)
    }
}

/// Externally supplied classifier capability
pub trait Predictor: Send + Sync {
    /// Feature names in the order the model was trained on
    fn feature_order(&self) -> &[String];

    /// Classify a feature vector already arranged in `feature_order()`
    fn predict(&self, features: &FeatureVector) -> Prediction;
}

/// Per-feature standardisation `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    fn apply(&self, values: &mut [f64]) {
        for ((x, m), s) in values.iter_mut().zip(&self.mean).zip(&self.scale) {
            *x = (*x - m) / s;
        }
    }
}

/// Multinomial logistic regression over standardised features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    pub feature_order: Vec<String>,
    pub classes: Vec<String>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
    /// One row per class, one column per feature
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl SoftmaxModel {
    pub fn validate(&self) -> Result<(), ModelError> {
        let features = self.feature_order.len();
        let classes = self.classes.len();
        if self.weights.len() != classes || self.bias.len() != classes {
            return Err(ModelError::ShapeMismatch {
                reason: format!(
                    "{} classes but {} weight rows and {} biases",
                    classes,
                    self.weights.len(),
                    self.bias.len()
                ),
            });
        }
        if let Some(row) = self.weights.iter().position(|w| w.len() != features) {
            return Err(ModelError::ShapeMismatch {
                reason: format!(
                    "weight row {} has {} columns, expected {}",
                    row,
                    self.weights[row].len(),
                    features
                ),
            });
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != features || scaler.scale.len() != features {
                return Err(ModelError::ShapeMismatch {
                    reason: "scaler length differs from feature order".to_string(),
                });
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(ModelError::ShapeMismatch {
                    reason: "scaler contains a zero or non-finite scale".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn probabilities(&self, features: &FeatureVector) -> Vec<f64> {
        let mut x = features.values();
        if let Some(scaler) = &self.scaler {
            scaler.apply(&mut x);
        }

        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>())
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.iter().map(|e| e / total).collect()
    }
}

/// Decision tree node, stored in a flat array with the root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { probabilities: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Children must come after their parent, which rules out cycles
    fn validate(&self, tree: usize, features: usize, classes: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidTree {
                tree,
                node: 0,
                reason: "tree has no nodes".to_string(),
            });
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let invalid = |reason: String| ModelError::InvalidTree {
                tree,
                node: index,
                reason,
            };
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= features {
                        return Err(invalid(format!("feature index {} out of range", feature)));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(invalid(format!("child index {} out of range", child)));
                        }
                    }
                }
                TreeNode::Leaf { probabilities } => {
                    if probabilities.len() != classes {
                        return Err(invalid(format!(
                            "leaf has {} probabilities, expected {}",
                            probabilities.len(),
                            classes
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf(&self, x: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { probabilities } => return probabilities,
            }
        }
    }
}

/// Random-forest style ensemble; class probabilities are averaged over trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub feature_order: Vec<String>,
    pub classes: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::ShapeMismatch {
                reason: "forest has no trees".to_string(),
            });
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, self.feature_order.len(), self.classes.len())?;
        }
        Ok(())
    }

    pub fn probabilities(&self, features: &FeatureVector) -> Vec<f64> {
        let x = features.values();
        let mut sum = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in sum.iter_mut().zip(tree.leaf(&x)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        sum.iter().map(|p| p / n).collect()
    }
}

/// Serialized model description, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Softmax(SoftmaxModel),
    Forest(ForestModel),
}

/// A trained classifier owned by one classification engine
pub enum TrainedModel {
    Softmax(SoftmaxModel),
    Forest(ForestModel),
    External(Box<dyn Predictor>),
}

impl TrainedModel {
    /// Validate a model description and wrap it
    pub fn from_spec(spec: ModelSpec) -> Result<Self, ModelError> {
        let (classes, model) = match spec {
            ModelSpec::Softmax(model) => {
                model.validate()?;
                (model.classes.clone(), TrainedModel::Softmax(model))
            }
            ModelSpec::Forest(model) => {
                model.validate()?;
                (model.classes.clone(), TrainedModel::Forest(model))
            }
        };

        if classes.is_empty() {
            return Err(ModelError::NoClasses);
        }
        for class in &classes {
            class
                .parse::<Severity>()
                .map_err(|_| ModelError::UnknownLabel {
                    label: class.clone(),
                })?;
        }
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let spec: ModelSpec = serde_json::from_str(json).map_err(|err| ModelError::Parse {
            reason: err.to_string(),
        })?;
        Self::from_spec(spec)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| ModelError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let model = Self::from_json(&contents)?;
        log::info!(
            "[Model] Loaded {} classifier from {:?} ({} features)",
            model.kind_name(),
            path,
            model.feature_order().len()
        );
        Ok(model)
    }

    pub fn external(predictor: impl Predictor + 'static) -> Self {
        TrainedModel::External(Box::new(predictor))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TrainedModel::Softmax(_) => "softmax",
            TrainedModel::Forest(_) => "forest",
            TrainedModel::External(_) => "external",
        }
    }
}

impl Predictor for TrainedModel {
    fn feature_order(&self) -> &[String] {
        match self {
            TrainedModel::Softmax(model) => &model.feature_order,
            TrainedModel::Forest(model) => &model.feature_order,
            TrainedModel::External(predictor) => predictor.feature_order(),
        }
    }

    fn predict(&self, features: &FeatureVector) -> Prediction {
        match self {
            TrainedModel::Softmax(model) => {
                Prediction::from_probabilities(&model.classes, &model.probabilities(features))
            }
            TrainedModel::Forest(model) => {
                Prediction::from_probabilities(&model.classes, &model.probabilities(features))
            }
            TrainedModel::External(predictor) => predictor.predict(features),
        }
    }
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("kind", &self.kind_name())
            .field("feature_order", &self.feature_order())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::{FeatureKind, FeatureSet};

    fn vector(rms: f64, dominant: f64) -> FeatureVector {
        FeatureSet {
            rms,
            dominant_frequency: dominant,
            ..FeatureSet::default()
        }
        .project(&[FeatureKind::Rms, FeatureKind::DominantFrequency])
    }

    fn forest_json() -> &'static str {
        r#"{
            "kind": "forest",
            "feature_order": ["rms", "dominant_frequency"],
            "classes": ["normal", "mild", "severe"],
            "trees": [
                {"nodes": [
                    {"type": "split", "feature": 1, "threshold": 8.0, "left": 1, "right": 2},
                    {"type": "leaf", "probabilities": [0.1, 0.2, 0.7]},
                    {"type": "leaf", "probabilities": [0.9, 0.1, 0.0]}
                ]},
                {"nodes": [
                    {"type": "split", "feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                    {"type": "leaf", "probabilities": [0.6, 0.3, 0.1]},
                    {"type": "leaf", "probabilities": [0.1, 0.1, 0.8]}
                ]}
            ]
        }"#
    }

    #[test]
    fn test_forest_averages_tree_probabilities() {
        let model = TrainedModel::from_json(forest_json()).unwrap();
        let prediction = model.predict(&vector(1.0, 5.0));
        assert_eq!(prediction.label, "severe");
        assert!((prediction.confidence - 0.75).abs() < 1e-12);
        assert!((prediction.probabilities["normal"] - 0.1).abs() < 1e-12);

        let prediction = model.predict(&vector(0.2, 12.0));
        assert_eq!(prediction.label, "normal");
        assert!((prediction.max_probability() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_with_scaler() {
        let json = r#"{
            "kind": "softmax",
            "feature_order": ["rms", "dominant_frequency"],
            "classes": ["normal", "severe"],
            "scaler": {"mean": [0.0, 4.0], "scale": [1.0, 2.0]},
            "weights": [[0.0, -3.0], [0.0, 3.0]],
            "bias": [0.0, 0.0]
        }"#;
        let model = TrainedModel::from_json(json).unwrap();
        // standardised frequency (4 - 4) / 2 = 0 -> equal logits
        let even = model.predict(&vector(1.0, 4.0));
        assert!((even.probabilities["normal"] - 0.5).abs() < 1e-12);
        assert_eq!(even.label, "normal");

        let high = model.predict(&vector(1.0, 8.0));
        assert_eq!(high.label, "severe");
        let total: f64 = high.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_class_rejected() {
        let json = forest_json().replace("\"mild\"", "\"moderate\"");
        assert_eq!(
            TrainedModel::from_json(&json).unwrap_err(),
            ModelError::UnknownLabel {
                label: "moderate".to_string()
            }
        );
    }

    #[test]
    fn test_backward_child_rejected() {
        let json = forest_json().replace("\"left\": 1, \"right\": 2", "\"left\": 0, \"right\": 2");
        assert!(matches!(
            TrainedModel::from_json(&json),
            Err(ModelError::InvalidTree { tree: 0, node: 0, .. })
        ));
    }

    #[test]
    fn test_softmax_shape_checked() {
        let json = r#"{
            "kind": "softmax",
            "feature_order": ["rms"],
            "classes": ["normal", "severe"],
            "weights": [[1.0]],
            "bias": [0.0, 0.0]
        }"#;
        assert!(matches!(
            TrainedModel::from_json(json),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_classes_rejected() {
        let json = r#"{
            "kind": "softmax",
            "feature_order": ["rms"],
            "classes": [],
            "weights": [],
            "bias": []
        }"#;
        assert_eq!(TrainedModel::from_json(json).unwrap_err(), ModelError::NoClasses);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            TrainedModel::from_json("{\"kind\": \"svm\"}"),
            Err(ModelError::Parse { .. })
        ));
    }
}
