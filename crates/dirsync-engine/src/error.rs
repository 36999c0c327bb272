//! Engine error types.
//!
//! Every failure the reconcilers see is folded onto [`ErrorClass`], which
//! decides between a Pending phase with a quick retry and a Failed phase.

use dirsync_api::{ApiError, Kind, ObjectKey};
use dirsync_directory::DirectoryError;
use thiserror::Error;

/// How a failure is reported and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A dependency is missing or not ready yet. Pending, quick retry.
    Transient,
    /// The declared spec is wrong. Failed until the spec changes.
    Permanent,
    /// The directory or the store misbehaved. Failed, retried at resync.
    Infrastructure,
}

/// Errors raised by the control-plane store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectKey),

    #[error("object already exists: {0}")]
    AlreadyExists(ObjectKey),

    #[error("invalid object: {0}")]
    Invalid(#[from] ApiError),

    #[error("patch on {key} changed immutable field {field}")]
    ImmutableField { key: ObjectKey, field: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while resolving a reference.
///
/// A missing target is not an error; see [`crate::resolver::Resolution`].
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("unknown kind {kind} in api version {api_version}")]
    UnknownKind { api_version: String, kind: String },

    #[error("{kind} '{name}' cannot be a parent: it does not produce a distinguished name")]
    NotDnCapable { kind: Kind, name: String },

    #[error("secret {secret} has no key '{key}'")]
    MissingSecretKey { secret: ObjectKey, key: String },
}

/// Errors raised while computing a distinguished name.
#[derive(Debug, Error)]
pub enum DnError {
    /// An ancestor or the root does not exist yet.
    #[error("{0}")]
    Unresolved(String),

    #[error("cyclic parent reference: {chain}")]
    CyclicReference { chain: String },

    #[error("parent chain of {key} is deeper than {limit}")]
    ReferenceDepthExceeded { key: ObjectKey, limit: usize },

    #[error("{ancestor} belongs to directory '{found}', expected '{expected}'")]
    DirectoryMismatch {
        ancestor: ObjectKey,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Errors raised while building an entry from a spec.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error(transparent)]
    Password(#[from] DirectoryError),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A dependency is not ready; the reason is shown to the user.
    #[error("{0}")]
    NotReady(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Dn(#[from] DnError),

    #[error("mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} is not a {1}")]
    WrongKind(ObjectKey, Kind),

    #[error("{field} of {key} is fixed at '{recorded}', cannot become '{requested}'; recreate the object instead")]
    ImmutableField {
        key: ObjectKey,
        field: &'static str,
        recorded: String,
        requested: String,
    },
}

impl EngineError {
    /// Classify the failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::NotReady(_) => ErrorClass::Transient,
            EngineError::Dn(DnError::Unresolved(_)) => ErrorClass::Transient,
            EngineError::Dn(DnError::Directory(e)) => directory_class(e),
            EngineError::Dn(DnError::Resolve(ResolveError::Store(_))) => {
                ErrorClass::Infrastructure
            }
            EngineError::Dn(_) => ErrorClass::Permanent,
            EngineError::Resolve(ResolveError::Store(_)) => ErrorClass::Infrastructure,
            EngineError::Resolve(_) => ErrorClass::Permanent,
            EngineError::Store(StoreError::Invalid(_)) => ErrorClass::Permanent,
            EngineError::Store(_) => ErrorClass::Infrastructure,
            EngineError::Mapping(MappingError::EmptyField { .. }) => ErrorClass::Permanent,
            EngineError::Mapping(MappingError::Password(_)) => ErrorClass::Infrastructure,
            EngineError::Directory(e) => directory_class(e),
            EngineError::Config(_)
            | EngineError::WrongKind(..)
            | EngineError::ImmutableField { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn directory_class(error: &DirectoryError) -> ErrorClass {
    match error {
        DirectoryError::InvalidDn { .. } | DirectoryError::InvalidEntry { .. } => {
            ErrorClass::Permanent
        }
        _ => ErrorClass::Infrastructure,
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
