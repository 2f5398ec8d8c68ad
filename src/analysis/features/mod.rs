// FeatureExtractor - windowed feature extraction for EMG tremor classification
//
// Module organization:
// - types: Feature catalogue, full FeatureSet, ordered FeatureVector
// - fft: Positive-bin magnitude spectra over the first SPECTRAL_LEN samples
// - spectral: Dominant frequency, spectral entropy, spectral centroid
// - temporal: Mean, variance, RMS, energy, zero crossings
// - complexity: Hjorth mobility and complexity
// - mod.rs: Coordinator (FeatureExtractor)
//
// Extraction is a pure function of the window and the sample rate.

mod complexity;
mod fft;
mod spectral;
mod temporal;
mod types;

pub use fft::SPECTRAL_LEN;
pub use types::{Extracted, Extraction, FeatureKind, FeatureSet, FeatureVector};

use crate::config::FeatureConfig;
use crate::error::ConfigError;
use fft::FftProcessor;
use spectral::SpectralFeatures;

/// Default minimum window length
pub const MIN_WINDOW_SAMPLES: usize = 100;

/// FeatureExtractor coordinates the time and frequency domain features
pub struct FeatureExtractor {
    fft_processor: FftProcessor,
    spectral_features: SpectralFeatures,
    kinds: Vec<FeatureKind>,
    min_samples: usize,
    sample_rate: f64,
}

impl FeatureExtractor {
    /// Create an extractor emitting the configured features in order
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `config` - Feature names and minimum window length
    pub fn new(sample_rate: f64, config: &FeatureConfig) -> Result<Self, ConfigError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate { value: sample_rate });
        }
        let kinds = FeatureKind::parse_list(&config.names)?;
        Ok(Self {
            fft_processor: FftProcessor::new(SPECTRAL_LEN),
            spectral_features: SpectralFeatures::new(sample_rate, SPECTRAL_LEN),
            kinds,
            min_samples: config.min_window_samples.max(1),
            sample_rate,
        })
    }

    /// Extractor with the default feature list and minimum
    pub fn with_defaults(sample_rate: f64) -> Result<Self, ConfigError> {
        Self::new(sample_rate, &FeatureConfig::default())
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|kind| kind.name()).collect()
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Compute every feature for one window
    ///
    /// Spectral features come from the first `SPECTRAL_LEN` samples and are
    /// zero when the window is shorter than that.
    ///
    /// # Returns
    /// `Extraction::NotReady` if the window is below the minimum length
    pub fn extract(&self, window: &[f64]) -> Extraction {
        if window.len() < self.min_samples {
            return Extraction::NotReady {
                available: window.len(),
                required: self.min_samples,
            };
        }

        let mean = temporal::compute_mean(window);
        let variance = temporal::compute_variance(window);
        let zero_crossings = temporal::compute_zero_crossings(window);
        let (mobility, complexity) = complexity::compute_hjorth(window);

        let mut set = FeatureSet {
            mean,
            std: variance.sqrt(),
            rms: temporal::compute_rms(window),
            variance,
            zero_crossings: zero_crossings as f64,
            zero_crossing_rate: temporal::compute_zero_crossing_rate(window),
            signal_energy: temporal::compute_energy(window),
            mobility,
            complexity,
            ..FeatureSet::default()
        };

        if let Some(spectrum) = self.fft_processor.positive_magnitudes(window) {
            set.dominant_frequency = self.spectral_features.compute_dominant_frequency(&spectrum);
            set.spectral_entropy = self.spectral_features.compute_entropy(&spectrum);
            set.spectral_centroid = self.spectral_features.compute_centroid(&spectrum);
        }

        Extraction::Ready(Extracted {
            vector: set.project(&self.kinds),
            set,
            window_len: window.len(),
        })
    }
}
