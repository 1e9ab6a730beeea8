//! Error types for restream
//!
//! This module defines the main error type used throughout the replay
//! pipeline. The taxonomy mirrors how failures propagate: source access
//! failures abort a replay before it starts, while decode and sink errors
//! are recovered locally so the pipeline keeps its emit-in-order guarantee.

use thiserror::Error;

/// Result type alias for restream operations
pub type Result<T> = std::result::Result<T, RestreamError>;

/// Main error type for restream
#[derive(Error, Debug)]
pub enum RestreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cannot list or open the blob store. Fatal at startup.
    #[error("Source access error: {0}")]
    SourceAccess(String),

    /// One malformed record or object. Recovered locally: skipped with a warning.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The sink rejected an emission synchronously. The event is dropped,
    /// the pipeline continues.
    #[error("Sink submission error: {0}")]
    SinkSubmission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RestreamError {
    /// Create a source access error from any displayable cause
    pub fn source_access(msg: impl Into<String>) -> Self {
        Self::SourceAccess(msg.into())
    }

    /// Create a decode error from any displayable cause
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a sink submission error from any displayable cause
    pub fn sink_submission(msg: impl Into<String>) -> Self {
        Self::SinkSubmission(msg.into())
    }

    /// Create a configuration error from any displayable cause
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error aborts a replay before the loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceAccess(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RestreamError::source_access("bucket not found");
        assert_eq!(err.to_string(), "Source access error: bucket not found");

        let err = RestreamError::decode("missing timestamp attribute");
        assert_eq!(err.to_string(), "Decode error: missing timestamp attribute");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RestreamError::source_access("x").is_fatal());
        assert!(RestreamError::config("x").is_fatal());
        assert!(!RestreamError::decode("x").is_fatal());
        assert!(!RestreamError::sink_submission("x").is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RestreamError = io.into();
        assert!(matches!(err, RestreamError::Io(_)));
    }
}
