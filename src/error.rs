//! Unified error handling for the veloroute library.
//!
//! Every recoverable failure is absorbed at the boundary nearest its cause
//! (gateway loads degrade to `None`, bad import files are skipped, failed
//! saves are logged); these types exist for the few operations that report
//! failure to their caller, such as backup restore.

use thiserror::Error;

/// Unified error type for veloroute operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed track file. The offending file is skipped; the batch continues.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Backup document missing required data. Store state is left untouched.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Snapshot load/save failure against a persistence gateway.
    #[error("persistence error: {message}")]
    Persistence { message: String },

    /// Key validation request failure. The key is marked invalid.
    #[error("network error: {message}")]
    Network { message: String },
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
        }
    }
}

/// Result type alias for veloroute operations.
pub type Result<T> = std::result::Result<T, Error>;
