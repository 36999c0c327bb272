//! API error types.

use thiserror::Error;

/// Errors raised while decoding or validating control-plane objects.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A manifest document could not be decoded.
    #[error("invalid manifest (document {document}): {message}")]
    InvalidManifest { document: usize, message: String },

    /// An object failed validation.
    #[error("invalid {kind} '{name}': {message}")]
    Validation {
        kind: String,
        name: String,
        message: String,
    },

    /// A kind name is not known.
    #[error("unknown kind: {0}")]
    UnknownKind(String),
}

impl ApiError {
    /// Create a validation error.
    pub fn validation(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ApiError::Validation {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
