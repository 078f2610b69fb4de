use quill_core::{QuillError, StorageFailure};
use thiserror::Error;

/// Result type for blob operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Storage quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Only produced by reads (`get`/`exists`); `delete` treats absence as success.
    #[error("Blob not found: {reference}")]
    NotFound { reference: String },

    /// Raised while building a backend from configuration, never by `put`/`delete`.
    #[error("Storage misconfigured: {message}")]
    Misconfigured { message: String },
}

impl StorageError {
    pub fn unreachable<S: Into<String>>(reason: S) -> Self {
        Self::Unreachable { reason: reason.into() }
    }

    pub fn quota_exceeded<S: Into<String>>(reason: S) -> Self {
        Self::QuotaExceeded { reason: reason.into() }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidPayload { message: message.into() }
    }

    pub fn not_found<S: Into<String>>(reference: S) -> Self {
        Self::NotFound { reference: reference.into() }
    }

    pub fn misconfigured<S: Into<String>>(message: S) -> Self {
        Self::Misconfigured { message: message.into() }
    }

    /// Classify a filesystem/stream error.
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidData | ErrorKind::InvalidInput => Self::invalid(format!("{context}: {err}")),
            ErrorKind::StorageFull | ErrorKind::FileTooLarge => Self::quota_exceeded(format!("{context}: {err}")),
            _ => Self::unreachable(format!("{context}: {err}")),
        }
    }

    /// Backend failure class, `None` for reads of missing blobs.
    pub fn failure(&self) -> Option<StorageFailure> {
        match self {
            Self::Unreachable { .. } | Self::Misconfigured { .. } => Some(StorageFailure::Unreachable),
            Self::QuotaExceeded { .. } => Some(StorageFailure::QuotaExceeded),
            Self::InvalidPayload { .. } => Some(StorageFailure::InvalidPayload),
            Self::NotFound { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for QuillError {
    fn from(err: StorageError) -> Self {
        match err.failure() {
            Some(failure) => QuillError::storage(failure, err.to_string()).with_source(err),
            None => QuillError::not_found(err.to_string()).with_source(err),
        }
    }
}
