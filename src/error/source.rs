// Source link error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Connect error code constants
///
/// Error code range: 2001-2003
pub struct ConnectErrorCodes {}

impl ConnectErrorCodes {
    /// Address could not be resolved or parsed
    pub const INVALID_ADDRESS: i32 = 2001;

    /// Remote end refused or did not answer
    pub const UNREACHABLE: i32 = 2002;

    /// Local I/O failure while opening the link
    pub const IO: i32 = 2003;
}

/// Log a connect error with structured context
pub fn log_connect_error(err: &ConnectError, context: &str) {
    error!(
        "Connect error in {}: code={}, component=SampleSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Failures while establishing a sample link
///
/// Only raised by `connect`. Once a link is open, read problems degrade to
/// "no sample" and never surface as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectError {
    InvalidAddress { address: String, reason: String },
    Unreachable { address: String, reason: String },
    Io { target: String, reason: String },
}

impl ErrorCode for ConnectError {
    fn code(&self) -> i32 {
        match self {
            ConnectError::InvalidAddress { .. } => ConnectErrorCodes::INVALID_ADDRESS,
            ConnectError::Unreachable { .. } => ConnectErrorCodes::UNREACHABLE,
            ConnectError::Io { .. } => ConnectErrorCodes::IO,
        }
    }

    fn message(&self) -> String {
        match self {
            ConnectError::InvalidAddress { address, reason } => {
                format!("Invalid address {}: {}", address, reason)
            }
            ConnectError::Unreachable { address, reason } => {
                format!("Cannot reach {}: {}", address, reason)
            }
            ConnectError::Io { target, reason } => format!("Failed to open {}: {}", target, reason),
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConnectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_codes() {
        let err = ConnectError::Unreachable {
            address: "127.0.0.1:1".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(err.code(), ConnectErrorCodes::UNREACHABLE);
        assert_eq!(err.message(), "Cannot reach 127.0.0.1:1: refused");
    }
}
