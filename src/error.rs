use thiserror::Error;

/// Errors surfaced by the normalization engine.
///
/// Every failure here is a caller-input error reported synchronously:
/// configuration problems at construction time, tensor-shape problems per
/// forward call. There are no transient or retryable variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Shape mismatch in operation '{operation}': expected {expected}, got {got}")]
    ShapeMismatch {
        operation: String,
        expected: String,
        got: String,
    },
}

impl NormError {
    /// Create a configuration error rejected at construction time.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error with operation context.
    pub fn shape_mismatch(operation: &str, expected: &str, got: &str) -> Self {
        Self::ShapeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for NormError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::ShapeMismatch {
            operation: "reshape".to_string(),
            expected: "a compatible shape".to_string(),
            got: format!("{err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, NormError>;
