// Error types for the tremor monitor pipeline
//
// Each fallible boundary of the pipeline (configuration, source link,
// trained model, result sink) has its own error enum with a stable numeric
// code so that logs and the CLI exit path can report them uniformly.

mod config;
mod model;
mod sink;
mod source;

pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use model::{log_model_error, ModelError, ModelErrorCodes};
pub use sink::{log_sink_error, SinkError, SinkErrorCodes};
pub use source::{log_connect_error, ConnectError, ConnectErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
