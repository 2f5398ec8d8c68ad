// Classifier - two-tier tremor severity classification
//
// Tier 1 maps the dominant frequency onto fixed bands with a bundled
// confidence. Tier 2 runs a trained classifier, and only when tier 1 is
// below the model threshold, so inference cost is paid on ambiguous windows
// only.

use crate::analysis::features::Extracted;
use crate::analysis::model::{Predictor, TrainedModel};
use crate::config::HeuristicConfig;
use crate::error::{ConfigError, ModelError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tremor severity label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Normal, Severity::Mild, Severity::Severe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    /// Case-insensitive; surrounding whitespace is ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Severity::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ModelError::UnknownLabel {
                label: s.to_string(),
            })
    }
}

/// Which tier produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTier {
    Heuristic,
    Model,
}

/// Engine output for one window
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub label: Severity,
    pub confidence: f64,
    pub tier: DecisionTier,
    /// Heuristic result below threshold with no usable classifier output
    pub low_confidence: bool,
    /// Per-class probabilities, model decisions only
    pub probabilities: Option<BTreeMap<String, f64>>,
}

/// Frequency-band classifier
#[derive(Debug, Clone)]
pub struct HeuristicTier {
    config: HeuristicConfig,
}

impl HeuristicTier {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Classify by dominant frequency
    ///
    /// Bands are half-open on the right except the severe band, which
    /// includes its upper edge. Anything above it (or NaN) is treated as
    /// noise: Normal with the out-of-band confidence.
    ///
    /// # Returns
    /// Tuple of (severity, confidence 0.0-1.0)
    pub fn classify(&self, dominant_frequency: f64) -> (Severity, f64) {
        let c = &self.config;
        if dominant_frequency < c.normal_below_hz {
            (Severity::Normal, c.normal_confidence)
        } else if dominant_frequency < c.mild_below_hz {
            (Severity::Mild, c.mild_confidence)
        } else if dominant_frequency <= c.severe_max_hz {
            (Severity::Severe, c.severe_confidence)
        } else {
            (Severity::Normal, c.out_of_band_confidence)
        }
    }

    pub fn model_threshold(&self) -> f64 {
        self.config.model_threshold
    }

    /// Labels the heuristic can only emit below the model threshold
    fn unconfident_labels(&self) -> Vec<(Severity, f64)> {
        let c = &self.config;
        let normal = c.normal_confidence.max(c.out_of_band_confidence);
        [
            (Severity::Normal, normal),
            (Severity::Mild, c.mild_confidence),
            (Severity::Severe, c.severe_confidence),
        ]
        .into_iter()
        .filter(|(_, confidence)| *confidence < c.model_threshold)
        .collect()
    }
}

/// Heuristic tier plus an optional trained classifier
pub struct ClassificationEngine {
    heuristic: HeuristicTier,
    classifier: Option<TrainedModel>,
    feature_names: Vec<String>,
}

impl ClassificationEngine {
    /// Build an engine for an extractor producing `feature_names`
    ///
    /// # Errors
    /// * `FeatureOrderMismatch` - classifier needs a feature the extractor lacks
    /// * `ClassifierRequired` - no classifier and some label is only reachable
    ///   below the model threshold
    pub fn new(
        config: HeuristicConfig,
        feature_names: &[&str],
        classifier: Option<TrainedModel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut engine = Self {
            heuristic: HeuristicTier::new(config),
            classifier: None,
            feature_names: feature_names.iter().map(|n| n.to_string()).collect(),
        };
        engine.set_classifier(classifier)?;
        Ok(engine)
    }

    /// Replace the trained classifier
    ///
    /// The previous classifier is returned. On error the engine is left
    /// unchanged.
    pub fn set_classifier(
        &mut self,
        classifier: Option<TrainedModel>,
    ) -> Result<Option<TrainedModel>, ConfigError> {
        match &classifier {
            Some(model) => {
                if let Some(missing) = model
                    .feature_order()
                    .iter()
                    .find(|name| !self.feature_names.contains(*name))
                {
                    return Err(ConfigError::FeatureOrderMismatch {
                        feature: missing.clone(),
                    });
                }
                tracing::info!(
                    "[Classifier] Installed {} classifier over {} features",
                    model.kind_name(),
                    model.feature_order().len()
                );
            }
            None => {
                if let Some((label, confidence)) =
                    self.heuristic.unconfident_labels().into_iter().next()
                {
                    return Err(ConfigError::ClassifierRequired {
                        label,
                        confidence,
                        threshold: self.heuristic.model_threshold(),
                    });
                }
            }
        }
        Ok(std::mem::replace(&mut self.classifier, classifier))
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn heuristic(&self) -> &HeuristicTier {
        &self.heuristic
    }

    /// Classify one extracted window
    ///
    /// # Panics
    /// If the classifier runs and the feature vector lacks one of its
    /// features (see `FeatureVector::reorder`).
    pub fn classify(&self, extracted: &Extracted) -> Decision {
        let (label, confidence) = self.heuristic.classify(extracted.set.dominant_frequency);
        let heuristic = Decision {
            label,
            confidence,
            tier: DecisionTier::Heuristic,
            low_confidence: false,
            probabilities: None,
        };
        if confidence >= self.heuristic.model_threshold() {
            return heuristic;
        }

        let Some(model) = &self.classifier else {
            return Decision {
                low_confidence: true,
                ..heuristic
            };
        };

        let features = extracted.vector.reorder(model.feature_order());
        let prediction = model.predict(&features);
        match prediction.label.parse::<Severity>() {
            Ok(label) => Decision {
                label,
                confidence: prediction.max_probability().clamp(0.0, 1.0),
                tier: DecisionTier::Model,
                low_confidence: false,
                probabilities: Some(prediction.probabilities),
            },
            Err(_) => {
                tracing::warn!(
                    "[Classifier] {} classifier returned unknown label {:?}; keeping heuristic result",
                    model.kind_name(),
                    prediction.label
                );
                Decision {
                    low_confidence: true,
                    ..heuristic
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
