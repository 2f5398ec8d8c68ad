//! Configuration management for the classification pipeline
//!
//! All tunables (sampling, feature selection, heuristic bands, dispatch
//! policy) live in one JSON-loadable structure. Every section has defaults
//! so a partial file only needs to name what it changes.

use crate::analysis::features::FeatureKind;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Device identifier reported to the sink when none is configured
pub const DEFAULT_DEVICE_ID: &str = "ESP32_CLASSIFIER";

/// Upper bound on the per-request sink timeout
pub const MAX_DISPATCH_TIMEOUT_MS: u64 = 2000;

/// Largest ring buffer accepted (one hour at 200 Hz)
pub const MAX_BUFFER_CAPACITY: usize = 720_000;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Identifier carried in every sink payload
    pub device_id: String,
    pub sampling: SamplingConfig,
    pub features: FeatureConfig,
    pub heuristic: HeuristicConfig,
    pub dispatch: DispatchConfig,
}

/// Ingestion and cadence parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Nominal sample rate of the acquisition device in Hz
    pub sample_rate_hz: f64,
    /// Ring buffer length in seconds
    pub buffer_seconds: f64,
    /// Number of most recent samples handed to the extractor per tick
    pub window_size: usize,
    /// Minimum spacing between classifications
    pub classify_interval_ms: u64,
    /// Sleep when no sample is ready
    pub poll_interval_ms: u64,
    /// Capacity of the reader thread queue
    pub reader_queue_capacity: usize,
    /// Stop the run loop after this many seconds
    pub max_run_seconds: Option<f64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 200.0,
            buffer_seconds: 5.0,
            window_size: 500,
            classify_interval_ms: 1000,
            poll_interval_ms: 5,
            reader_queue_capacity: 1024,
            max_run_seconds: None,
        }
    }
}

impl SamplingConfig {
    /// Ring buffer capacity in samples (`buffer_seconds * sample_rate_hz`)
    pub fn capacity(&self) -> usize {
        let samples = (self.buffer_seconds * self.sample_rate_hz).round();
        if samples.is_finite() && samples > 0.0 {
            samples as usize
        } else {
            0
        }
    }

    pub fn classify_interval(&self) -> Duration {
        Duration::from_millis(self.classify_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_run(&self) -> Option<Duration> {
        self.max_run_seconds
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Ordered feature names emitted by the extractor
    pub names: Vec<String>,
    /// Windows shorter than this are not analysed
    pub min_window_samples: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            names: FeatureKind::DEFAULT
                .iter()
                .map(|kind| kind.name().to_string())
                .collect(),
            min_window_samples: 100,
        }
    }
}

/// Heuristic frequency bands and the model-tier threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Dominant frequencies below this are Normal
    pub normal_below_hz: f64,
    /// Dominant frequencies below this (and above `normal_below_hz`) are Mild
    pub mild_below_hz: f64,
    /// Dominant frequencies up to and including this are Severe
    pub severe_max_hz: f64,
    pub normal_confidence: f64,
    pub mild_confidence: f64,
    pub severe_confidence: f64,
    /// Confidence reported for frequencies above `severe_max_hz`
    pub out_of_band_confidence: f64,
    /// Heuristic results below this confidence are deferred to the classifier
    pub model_threshold: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            normal_below_hz: 1.0,
            mild_below_hz: 3.0,
            severe_max_hz: 6.0,
            normal_confidence: 0.95,
            mild_confidence: 0.80,
            severe_confidence: 0.70,
            out_of_band_confidence: 0.0,
            model_threshold: 0.7,
        }
    }
}

/// Result dispatch and health policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Base URL of the result sink; results go to `{sink_url}/api/tremor`
    pub sink_url: Option<String>,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Failures needed before the link may be reported Degraded
    pub degraded_after_failures: u32,
    /// Failures after which the link is Lost
    pub lost_after_failures: u32,
    /// Time since the last success before Degraded applies
    pub disconnect_threshold_ms: u64,
    /// `dataType` field of the payload
    pub data_type: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sink_url: None,
            timeout_ms: 1000,
            degraded_after_failures: 3,
            lost_after_failures: 5,
            disconnect_threshold_ms: 3000,
            data_type: "realtime_classification".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn disconnect_threshold(&self) -> Duration {
        Duration::from_millis(self.disconnect_threshold_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            sampling: SamplingConfig::default(),
            features: FeatureConfig::default(),
            heuristic: HeuristicConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated before
    /// it is returned.
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// * `Ok(PipelineConfig)` - Loaded and validated configuration
    /// * `Err(ConfigError)` - File unreadable, malformed, or inconsistent
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            log::warn!("[Config] Failed to read config file {:?}: {}", path, err);
            ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;

        let config: PipelineConfig = serde_json::from_str(&contents).map_err(|err| {
            log::warn!("[Config] Failed to parse JSON from {:?}: {}", path, err);
            ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;

        config.validate()?;
        log::info!("[Config] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Check every section for values that cannot produce a correct pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sampling = &self.sampling;
        if !sampling.sample_rate_hz.is_finite() || sampling.sample_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidSampleRate {
                value: sampling.sample_rate_hz,
            });
        }

        let capacity = sampling.capacity();
        if capacity == 0 || capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::InvalidBufferCapacity {
                seconds: sampling.buffer_seconds,
                sample_rate: sampling.sample_rate_hz,
            });
        }

        let minimum = self.features.min_window_samples.max(1);
        if sampling.window_size < minimum || sampling.window_size > capacity {
            return Err(ConfigError::InvalidWindow {
                window: sampling.window_size,
                capacity,
                minimum,
            });
        }

        if sampling.reader_queue_capacity == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "sampling.reader_queue_capacity".to_string(),
                value: 0.0,
            });
        }

        FeatureKind::parse_list(&self.features.names)?;
        self.heuristic.validate()?;
        self.dispatch.validate()
    }
}

impl HeuristicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bands = [
            ("heuristic.normal_below_hz", self.normal_below_hz),
            ("heuristic.mild_below_hz", self.mild_below_hz),
            ("heuristic.severe_max_hz", self.severe_max_hz),
        ];
        for (field, value) in bands {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }
        if self.mild_below_hz < self.normal_below_hz {
            return Err(ConfigError::InvalidThreshold {
                field: "heuristic.mild_below_hz".to_string(),
                value: self.mild_below_hz,
            });
        }
        if self.severe_max_hz < self.mild_below_hz {
            return Err(ConfigError::InvalidThreshold {
                field: "heuristic.severe_max_hz".to_string(),
                value: self.severe_max_hz,
            });
        }

        let unit = [
            ("heuristic.normal_confidence", self.normal_confidence),
            ("heuristic.mild_confidence", self.mild_confidence),
            ("heuristic.severe_confidence", self.severe_confidence),
            (
                "heuristic.out_of_band_confidence",
                self.out_of_band_confidence,
            ),
            ("heuristic.model_threshold", self.model_threshold),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 || self.timeout_ms > MAX_DISPATCH_TIMEOUT_MS {
            return Err(ConfigError::InvalidDispatch {
                reason: format!(
                    "timeout_ms must be in 1..={}, got {}",
                    MAX_DISPATCH_TIMEOUT_MS, self.timeout_ms
                ),
            });
        }
        if self.degraded_after_failures == 0 {
            return Err(ConfigError::InvalidDispatch {
                reason: "degraded_after_failures must be at least 1".to_string(),
            });
        }
        if self.lost_after_failures < self.degraded_after_failures {
            return Err(ConfigError::InvalidDispatch {
                reason: format!(
                    "lost_after_failures ({}) is below degraded_after_failures ({})",
                    self.lost_after_failures, self.degraded_after_failures
                ),
            });
        }
        if let Some(url) = &self.sink_url {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidDispatch {
                    reason: "sink_url is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
