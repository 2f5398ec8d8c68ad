// Trained model error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Model error code constants
///
/// Error code range: 3001-3006
pub struct ModelErrorCodes {}

impl ModelErrorCodes {
    pub const IO: i32 = 3001;
    pub const PARSE: i32 = 3002;
    pub const NO_CLASSES: i32 = 3003;
    pub const UNKNOWN_LABEL: i32 = 3004;
    pub const SHAPE_MISMATCH: i32 = 3005;
    pub const INVALID_TREE: i32 = 3006;
}

/// Log a model error with structured context
pub fn log_model_error(err: &ModelError, context: &str) {
    error!(
        "Model error in {}: code={}, component=TrainedModel, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while loading or validating a trained model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    Io { path: String, reason: String },
    Parse { reason: String },
    NoClasses,
    UnknownLabel { label: String },
    ShapeMismatch { reason: String },
    InvalidTree { tree: usize, node: usize, reason: String },
}

impl ErrorCode for ModelError {
    fn code(&self) -> i32 {
        match self {
            ModelError::Io { .. } => ModelErrorCodes::IO,
            ModelError::Parse { .. } => ModelErrorCodes::PARSE,
            ModelError::NoClasses => ModelErrorCodes::NO_CLASSES,
            ModelError::UnknownLabel { .. } => ModelErrorCodes::UNKNOWN_LABEL,
            ModelError::ShapeMismatch { .. } => ModelErrorCodes::SHAPE_MISMATCH,
            ModelError::InvalidTree { .. } => ModelErrorCodes::INVALID_TREE,
        }
    }

    fn message(&self) -> String {
        match self {
            ModelError::Io { path, reason } => format!("Failed to read model {}: {}", path, reason),
            ModelError::Parse { reason } => format!("Malformed model: {}", reason),
            ModelError::NoClasses => "Model declares no classes".to_string(),
            ModelError::UnknownLabel { label } => {
                format!("Model class '{}' is not a severity label", label)
            }
            ModelError::ShapeMismatch { reason } => format!("Model shape mismatch: {}", reason),
            ModelError::InvalidTree { tree, node, reason } => {
                format!("Tree {} node {}: {}", tree, node, reason)
            }
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModelError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_codes() {
        assert_eq!(ModelError::NoClasses.code(), 3003);
        assert_eq!(
            ModelError::InvalidTree {
                tree: 1,
                node: 4,
                reason: "child index out of range".to_string()
            }
            .message(),
            "Tree 1 node 4: child index out of range"
        );
    }
}
