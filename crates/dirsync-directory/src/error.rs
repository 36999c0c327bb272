//! Directory error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// LDAP result code: no such object.
pub const RC_NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code: invalid credentials.
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code: operation not allowed on a non-leaf entry.
pub const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
/// LDAP result code: entry already exists.
pub const RC_ALREADY_EXISTS: u32 = 68;

/// Error that can occur while talking to a directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Connection errors (transient)
    /// Failed to establish a session with the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A request did not complete in time.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    // Authentication errors (permanent)
    /// The bind credentials were rejected.
    #[error("authentication failed: invalid credentials for {bind_dn}")]
    AuthenticationFailed { bind_dn: String },

    /// TLS material could not be loaded.
    #[error("tls error: {message}")]
    Tls { message: String },

    // Configuration errors (permanent)
    /// Client configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Entry errors
    /// No entry exists at the DN.
    #[error("entry not found: {dn}")]
    NotFound { dn: String },

    /// An entry already exists at the DN.
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The entry has children and cannot be removed non-recursively.
    #[error("entry has children: {dn}")]
    NotAllowedOnNonLeaf { dn: String },

    /// A distinguished name could not be parsed or built.
    #[error("invalid distinguished name '{dn}': {message}")]
    InvalidDn { dn: String, message: String },

    /// The entry itself is malformed.
    #[error("invalid entry '{dn}': {message}")]
    InvalidEntry { dn: String, message: String },

    /// The directory rejected an operation.
    #[error("operation failed (rc={rc}): {message}")]
    OperationFailed {
        rc: u32,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Password hashing or verification failed.
    #[error("password hashing failed: {message}")]
    PasswordHash { message: String },
}

impl DirectoryError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::Timeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Whether the error means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::Timeout { .. } => "TIMEOUT",
            DirectoryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            DirectoryError::Tls { .. } => "TLS_ERROR",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::NotFound { .. } => "NOT_FOUND",
            DirectoryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            DirectoryError::NotAllowedOnNonLeaf { .. } => "NOT_ALLOWED_ON_NON_LEAF",
            DirectoryError::InvalidDn { .. } => "INVALID_DN",
            DirectoryError::InvalidEntry { .. } => "INVALID_ENTRY",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
            DirectoryError::PasswordHash { .. } => "PASSWORD_HASH_FAILED",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error with source, for transport failures
    /// that never produced a result code.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            rc: 0,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn invalid_dn(dn: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::InvalidDn {
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Map a non-zero LDAP result code on `dn` to an error.
    pub fn from_result_code(rc: u32, text: &str, dn: &str) -> Self {
        match rc {
            RC_NO_SUCH_OBJECT => DirectoryError::NotFound { dn: dn.to_string() },
            RC_INVALID_CREDENTIALS => DirectoryError::AuthenticationFailed {
                bind_dn: dn.to_string(),
            },
            RC_NOT_ALLOWED_ON_NON_LEAF => DirectoryError::NotAllowedOnNonLeaf { dn: dn.to_string() },
            RC_ALREADY_EXISTS => DirectoryError::AlreadyExists { dn: dn.to_string() },
            _ => DirectoryError::OperationFailed {
                rc,
                message: format!("{dn}: {text}"),
                source: None,
            },
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
