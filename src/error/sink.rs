// Result sink error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Sink error code constants
///
/// Error code range: 4001-4004
pub struct SinkErrorCodes {}

impl SinkErrorCodes {
    /// Sink URL is empty or not http(s)
    pub const INVALID_URL: i32 = 4001;

    /// HTTP client could not be constructed
    pub const CLIENT: i32 = 4002;

    /// Request failed before a status code was received
    pub const TRANSPORT: i32 = 4003;

    /// HTTP client gave up waiting for a response
    pub const TIMED_OUT: i32 = 4004;
}

/// Log a sink error with structured context
pub fn log_sink_error(err: &SinkError, context: &str) {
    error!(
        "Sink error in {}: code={}, component=ResultSink, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Result sink errors
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    InvalidUrl { url: String },
    Client { reason: String },
    Transport { reason: String },
    TimedOut,
}

impl ErrorCode for SinkError {
    fn code(&self) -> i32 {
        match self {
            SinkError::InvalidUrl { .. } => SinkErrorCodes::INVALID_URL,
            SinkError::Client { .. } => SinkErrorCodes::CLIENT,
            SinkError::Transport { .. } => SinkErrorCodes::TRANSPORT,
            SinkError::TimedOut => SinkErrorCodes::TIMED_OUT,
        }
    }

    fn message(&self) -> String {
        match self {
            SinkError::InvalidUrl { url } => format!("Invalid sink URL: {:?}", url),
            SinkError::Client { reason } => format!("Failed to build HTTP client: {}", reason),
            SinkError::Transport { reason } => format!("Request failed: {}", reason),
            SinkError::TimedOut => "Request timed out".to_string(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SinkError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SinkError {}
