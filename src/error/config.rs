// Configuration error types and constants

use crate::analysis::Severity;
use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 1001-1010
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Sample rate is zero, negative or not finite
    pub const INVALID_SAMPLE_RATE: i32 = 1001;

    /// Ring buffer capacity resolves to zero samples
    pub const INVALID_BUFFER_CAPACITY: i32 = 1002;

    /// Classification window does not fit the buffer or the extractor minimum
    pub const INVALID_WINDOW: i32 = 1003;

    /// Feature name is not part of the catalogue
    pub const UNKNOWN_FEATURE: i32 = 1004;

    /// Feature name listed more than once
    pub const DUPLICATE_FEATURE: i32 = 1005;

    /// Heuristic band edge, confidence or threshold out of range
    pub const INVALID_THRESHOLD: i32 = 1006;

    /// Classifier expects a feature the extractor does not produce
    pub const FEATURE_ORDER_MISMATCH: i32 = 1007;

    /// Heuristic alone cannot reach the threshold for some label
    pub const CLASSIFIER_REQUIRED: i32 = 1008;

    /// Dispatch timeout or health policy is inconsistent
    pub const INVALID_DISPATCH: i32 = 1009;

    /// Configuration file could not be read or parsed
    pub const LOAD_FAILED: i32 = 1010;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=PipelineConfig, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration errors
///
/// Raised when a pipeline is assembled from settings that cannot produce a
/// correct result stream. All of them are detected before any sample is read.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidSampleRate { value: f64 },
    InvalidBufferCapacity { seconds: f64, sample_rate: f64 },
    InvalidWindow { window: usize, capacity: usize, minimum: usize },
    UnknownFeature { name: String },
    DuplicateFeature { name: String },
    InvalidThreshold { field: String, value: f64 },
    FeatureOrderMismatch { feature: String },
    ClassifierRequired { label: Severity, confidence: f64, threshold: f64 },
    InvalidDispatch { reason: String },
    LoadFailed { path: String, reason: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidSampleRate { .. } => ConfigErrorCodes::INVALID_SAMPLE_RATE,
            ConfigError::InvalidBufferCapacity { .. } => ConfigErrorCodes::INVALID_BUFFER_CAPACITY,
            ConfigError::InvalidWindow { .. } => ConfigErrorCodes::INVALID_WINDOW,
            ConfigError::UnknownFeature { .. } => ConfigErrorCodes::UNKNOWN_FEATURE,
            ConfigError::DuplicateFeature { .. } => ConfigErrorCodes::DUPLICATE_FEATURE,
            ConfigError::InvalidThreshold { .. } => ConfigErrorCodes::INVALID_THRESHOLD,
            ConfigError::FeatureOrderMismatch { .. } => ConfigErrorCodes::FEATURE_ORDER_MISMATCH,
            ConfigError::ClassifierRequired { .. } => ConfigErrorCodes::CLASSIFIER_REQUIRED,
            ConfigError::InvalidDispatch { .. } => ConfigErrorCodes::INVALID_DISPATCH,
            ConfigError::LoadFailed { .. } => ConfigErrorCodes::LOAD_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::InvalidSampleRate { value } => {
                format!("Sample rate must be positive and finite, got {}", value)
            }
            ConfigError::InvalidBufferCapacity {
                seconds,
                sample_rate,
            } => format!(
                "Buffer of {}s at {} Hz is empty or exceeds the supported capacity",
                seconds, sample_rate
            ),
            ConfigError::InvalidWindow {
                window,
                capacity,
                minimum,
            } => format!(
                "Window of {} samples must be within [{}, {}]",
                window, minimum, capacity
            ),
            ConfigError::UnknownFeature { name } => format!("Unknown feature: {}", name),
            ConfigError::DuplicateFeature { name } => format!("Feature listed twice: {}", name),
            ConfigError::InvalidThreshold { field, value } => {
                format!("Invalid value for {}: {}", field, value)
            }
            ConfigError::FeatureOrderMismatch { feature } => format!(
                "Classifier expects feature '{}' which the extractor does not produce",
                feature
            ),
            ConfigError::ClassifierRequired {
                label,
                confidence,
                threshold,
            } => format!(
                "Heuristic confidence {} for '{}' is below threshold {} and no classifier is installed",
                confidence, label, threshold
            ),
            ConfigError::InvalidDispatch { reason } => format!("Invalid dispatch settings: {}", reason),
            ConfigError::LoadFailed { path, reason } => {
                format!("Failed to load config from {}: {}", path, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        assert_eq!(
            ConfigError::InvalidSampleRate { value: 0.0 }.code(),
            ConfigErrorCodes::INVALID_SAMPLE_RATE
        );
        assert_eq!(
            ConfigError::UnknownFeature {
                name: "kurtosis".to_string()
            }
            .code(),
            1004
        );
        assert_eq!(
            ConfigError::ClassifierRequired {
                label: Severity::Mild,
                confidence: 0.8,
                threshold: 0.9
            }
            .code(),
            ConfigErrorCodes::CLASSIFIER_REQUIRED
        );
        assert_eq!(
            ConfigError::LoadFailed {
                path: "x".to_string(),
                reason: "y".to_string()
            }
            .code(),
            1010
        );
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::InvalidWindow {
            window: 2000,
            capacity: 1000,
            minimum: 100,
        };
        assert_eq!(
            err.message(),
            "Window of 2000 samples must be within [100, 1000]"
        );

        let err = ConfigError::FeatureOrderMismatch {
            feature: "mobility".to_string(),
        };
        assert!(err.message().contains("'mobility'"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DuplicateFeature {
            name: "rms".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("ConfigError"));
        assert!(display.contains("1005"));
    }
}
