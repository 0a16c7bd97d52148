//! Error handling for modelserve
//!
//! Provides a unified error type and result type for use across all modelserve components.
//! The error is `Clone` so that a single load outcome can be handed to every caller that
//! joined the same in-flight load.

/// Result type alias for modelserve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for modelserve
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Artifact could not be retrieved from storage
    #[error("Download error: {0}")]
    Download(String),

    /// Artifact bytes do not match the declared framework format
    #[error("Decode error: {0}")]
    Decode(String),

    /// Framework tag is not one of the known variants
    #[error("Unsupported framework: {0}")]
    UnsupportedFramework(String),

    /// Predict issued for a model that is not in the cache
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Feature absent from the request with no registered default
    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    /// Feature value cannot be converted to model input
    #[error("Invalid feature {name}: {reason}")]
    InvalidFeature { name: String, reason: String },

    /// Registry or store lookup miss
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Model handle rejected the input or produced unusable output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// External key-value store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Invalid request or parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a download error
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an unsupported framework error
    pub fn unsupported_framework(tag: impl Into<String>) -> Self {
        Self::UnsupportedFramework(tag.into())
    }

    /// Create a model not loaded error
    pub fn model_not_loaded(model_id: impl Into<String>) -> Self {
        Self::ModelNotLoaded(model_id.into())
    }

    /// Create a missing feature error
    pub fn missing_feature(name: impl Into<String>) -> Self {
        Self::MissingFeature(name.into())
    }

    /// Create an invalid feature error
    pub fn invalid_feature(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFeature {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if the caller could reasonably repeat the operation.
    ///
    /// The serving core never retries on its own; this is a hint for the
    /// orchestration layer above it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Download(_) | Error::Timeout(_) | Error::Store(_) | Error::Io(_)
        )
    }

    /// Check if this error indicates a caller or configuration problem
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFramework(_)
                | Error::ModelNotLoaded(_)
                | Error::MissingFeature(_)
                | Error::InvalidFeature { .. }
                | Error::NotFound(_)
                | Error::InvalidConfiguration(_)
                | Error::InvalidRequest(_)
        )
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Download(_) => "download",
            Error::Decode(_) => "decode",
            Error::UnsupportedFramework(_) => "unsupported_framework",
            Error::ModelNotLoaded(_) => "model_not_loaded",
            Error::MissingFeature(_) => "missing_feature",
            Error::InvalidFeature { .. } => "invalid_feature",
            Error::NotFound(_) => "not_found",
            Error::Inference(_) => "inference",
            Error::Timeout(_) => "timeout",
            Error::Store(_) => "store",
            Error::InvalidConfiguration(_) => "configuration",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::InvalidConfiguration(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}

/// Extension trait for adding context to Results
pub trait ErrorContext<T> {
    /// Prefix the error message with `context`, keeping the error kind
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().prefixed(context.into()))
    }
}

impl Error {
    fn prefixed(self, context: String) -> Self {
        let wrap = |msg: String| format!("{}: {}", context, msg);
        match self {
            Error::Download(m) => Error::Download(wrap(m)),
            Error::Decode(m) => Error::Decode(wrap(m)),
            Error::UnsupportedFramework(m) => Error::UnsupportedFramework(m),
            Error::ModelNotLoaded(m) => Error::ModelNotLoaded(m),
            Error::MissingFeature(m) => Error::MissingFeature(m),
            Error::InvalidFeature { name, reason } => Error::InvalidFeature {
                name,
                reason: wrap(reason),
            },
            Error::NotFound(m) => Error::NotFound(wrap(m)),
            Error::Inference(m) => Error::Inference(wrap(m)),
            Error::Timeout(m) => Error::Timeout(wrap(m)),
            Error::Store(m) => Error::Store(wrap(m)),
            Error::InvalidConfiguration(m) => Error::InvalidConfiguration(wrap(m)),
            Error::InvalidRequest(m) => Error::InvalidRequest(wrap(m)),
            Error::Serialization(m) => Error::Serialization(wrap(m)),
            Error::Io(m) => Error::Io(wrap(m)),
            Error::Internal(m) => Error::Internal(wrap(m)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::missing_feature("age");
        assert!(matches!(err, Error::MissingFeature(_)));
        assert_eq!(err.to_string(), "Missing required feature: age");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::download("test").category(), "download");
        assert_eq!(Error::model_not_loaded("m").category(), "model_not_loaded");
        assert_eq!(Error::invalid_feature("x", "bad").category(), "invalid_feature");
    }

    #[test]
    fn test_error_classification() {
        let client_err = Error::unsupported_framework("onnx");
        assert!(client_err.is_client_error());
        assert!(!client_err.is_retryable());

        let server_err = Error::download("bucket unreachable");
        assert!(!server_err.is_client_error());
        assert!(server_err.is_retryable());
    }

    #[test]
    fn test_errors_compare_by_value() {
        assert_eq!(Error::decode("bad header"), Error::decode("bad header"));
        assert_ne!(Error::decode("bad header"), Error::download("bad header"));
    }

    #[test]
    fn test_error_context_keeps_kind() {
        let result: std::result::Result<(), Error> = Err(Error::download("connection reset"));
        let err = result.with_context("fetching models/churn.json").unwrap_err();

        assert!(matches!(err, Error::Download(_)));
        assert!(err.to_string().contains("fetching models/churn.json"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_io_error_conversion() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let err = result.with_context("failed to read artifact").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("failed to read artifact"));
        assert!(err.to_string().contains("file not found"));
    }
}
