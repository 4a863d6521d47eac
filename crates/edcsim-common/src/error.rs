//! Error types for the simulator.
//!
//! Three classes, per the design's error handling notes: configuration
//! errors (rejected before any iteration runs), internal invariant
//! violations (an iteration is abandoned and excluded from statistics), and
//! numerical edge cases, which are handled as ordinary control flow rather
//! than errors and so have no variant here.

use thiserror::Error;

/// Result type used throughout the simulator.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("trace error: {0}")]
    Trace(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an internal invariant-violation error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a trace-ingestion error.
    pub fn trace(msg: impl Into<String>) -> Self {
        Self::Trace(msg.into())
    }

    /// Configuration errors are fatal to the whole run and should exit
    /// before any iteration starts.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Internal errors abandon only the iteration that hit them; the driver
    /// logs and excludes it from the aggregate sample set.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Process exit code to use when this error reaches `main`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_exit_with_code_2() {
        assert_eq!(Error::configuration("bad flag").exit_code(), 2);
        assert!(Error::configuration("bad flag").is_configuration());
    }

    #[test]
    fn internal_errors_are_distinguishable() {
        assert!(Error::internal("empty repair queue").is_internal());
        assert!(!Error::internal("empty repair queue").is_configuration());
    }
}
