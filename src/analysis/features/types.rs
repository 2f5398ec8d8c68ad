// Types module - Data structures for signal features
//
// `FeatureSet` always carries every catalogue value; `FeatureVector` is the
// configured, ordered projection of it that classifiers consume.

use crate::error::ConfigError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// Catalogue of features the extractor knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Mean,
    Std,
    Rms,
    Variance,
    ZeroCrossings,
    ZeroCrossingRate,
    SignalEnergy,
    DominantFrequency,
    SpectralCentroid,
    SpectralEntropy,
    Mobility,
    Complexity,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 12] = [
        FeatureKind::Mean,
        FeatureKind::Std,
        FeatureKind::Rms,
        FeatureKind::Variance,
        FeatureKind::ZeroCrossings,
        FeatureKind::ZeroCrossingRate,
        FeatureKind::SignalEnergy,
        FeatureKind::DominantFrequency,
        FeatureKind::SpectralCentroid,
        FeatureKind::SpectralEntropy,
        FeatureKind::Mobility,
        FeatureKind::Complexity,
    ];

    /// Features emitted when the configuration does not name any
    pub const DEFAULT: [FeatureKind; 8] = [
        FeatureKind::Mean,
        FeatureKind::Rms,
        FeatureKind::Variance,
        FeatureKind::ZeroCrossings,
        FeatureKind::DominantFrequency,
        FeatureKind::SpectralEntropy,
        FeatureKind::Mobility,
        FeatureKind::Complexity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Mean => "mean",
            FeatureKind::Std => "std",
            FeatureKind::Rms => "rms",
            FeatureKind::Variance => "variance",
            FeatureKind::ZeroCrossings => "zero_crossings",
            FeatureKind::ZeroCrossingRate => "zero_crossing_rate",
            FeatureKind::SignalEnergy => "signal_energy",
            FeatureKind::DominantFrequency => "dominant_frequency",
            FeatureKind::SpectralCentroid => "spectral_centroid",
            FeatureKind::SpectralEntropy => "spectral_entropy",
            FeatureKind::Mobility => "mobility",
            FeatureKind::Complexity => "complexity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Resolve a configured name list, rejecting unknown and repeated names
    pub fn parse_list(names: &[String]) -> Result<Vec<FeatureKind>, ConfigError> {
        let mut seen = HashSet::new();
        let mut kinds = Vec::with_capacity(names.len());
        for name in names {
            let kind = Self::from_name(name).ok_or_else(|| ConfigError::UnknownFeature {
                name: name.clone(),
            })?;
            if !seen.insert(kind) {
                return Err(ConfigError::DuplicateFeature { name: name.clone() });
            }
            kinds.push(kind);
        }
        Ok(kinds)
    }
}

/// Every catalogue feature computed from one window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureSet {
    pub mean: f64,
    pub std: f64,
    pub rms: f64,
    pub variance: f64,
    /// Sign changes between consecutive nonzero samples
    pub zero_crossings: f64,
    pub zero_crossing_rate: f64,
    pub signal_energy: f64,
    /// Hz; 0 when the window is shorter than the spectral analysis length
    pub dominant_frequency: f64,
    pub spectral_centroid: f64,
    /// Shannon entropy (bits) of the normalised power spectrum
    pub spectral_entropy: f64,
    /// Hjorth mobility
    pub mobility: f64,
    /// Hjorth complexity
    pub complexity: f64,
}

impl FeatureSet {
    pub fn value(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::Mean => self.mean,
            FeatureKind::Std => self.std,
            FeatureKind::Rms => self.rms,
            FeatureKind::Variance => self.variance,
            FeatureKind::ZeroCrossings => self.zero_crossings,
            FeatureKind::ZeroCrossingRate => self.zero_crossing_rate,
            FeatureKind::SignalEnergy => self.signal_energy,
            FeatureKind::DominantFrequency => self.dominant_frequency,
            FeatureKind::SpectralCentroid => self.spectral_centroid,
            FeatureKind::SpectralEntropy => self.spectral_entropy,
            FeatureKind::Mobility => self.mobility,
            FeatureKind::Complexity => self.complexity,
        }
    }

    pub fn project(&self, kinds: &[FeatureKind]) -> FeatureVector {
        FeatureVector {
            entries: kinds.iter().map(|&kind| (kind, self.value(kind))).collect(),
        }
    }
}

/// Ordered mapping of feature names to values
///
/// Serializes as a JSON object whose keys keep the vector order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    entries: Vec<(FeatureKind, f64)>,
}

impl FeatureVector {
    pub fn from_entries(entries: Vec<(FeatureKind, f64)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FeatureKind::from_name(name).and_then(|kind| self.value(kind))
    }

    pub fn value(&self, kind: FeatureKind) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(kind, _)| kind.name()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.entries.iter().map(|(kind, v)| (kind.name(), *v))
    }

    /// Rearrange into the order a classifier was trained on
    ///
    /// # Panics
    /// If `order` names a feature this vector does not hold. Engines check
    /// feature orders when a classifier is installed, so reaching this is
    /// a programming error.
    pub fn reorder(&self, order: &[String]) -> FeatureVector {
        let entries = order
            .iter()
            .map(|name| {
                let kind = FeatureKind::from_name(name);
                match kind.and_then(|k| self.value(k).map(|v| (k, v))) {
                    Some(entry) => entry,
                    None => panic!("feature vector has no value for '{}'", name),
                }
            })
            .collect();
        FeatureVector { entries }
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, value) in &self.entries {
            map.serialize_entry(kind.name(), value)?;
        }
        map.end()
    }
}

/// Successful extraction: the full set plus the configured projection
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub set: FeatureSet,
    pub vector: FeatureVector,
    pub window_len: usize,
}

/// Outcome of a feature extraction call
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Ready(Extracted),
    /// Window shorter than the extractor minimum
    NotReady { available: usize, required: usize },
}

impl Extraction {
    pub fn ready(self) -> Option<Extracted> {
        match self {
            Extraction::Ready(extracted) => Some(extracted),
            Extraction::NotReady { .. } => None,
        }
    }
}
