//! # Errors
//!
//! Quill reports every failure of a post mutation through one structured
//! error, [`QuillError`], whose [`ErrorKind`] is the discriminant the UI layer
//! switches on.
//!
//! - authorization and validation failures are terminal and carry no source
//! - storage failures carry the backend classification ([`StorageFailure`])
//! - record-store failures keep the underlying error as `source`
//!
//! If you enable feature `serde`, you also get `to_json()`.

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for Quill APIs.
pub type QuillResult<T> = std::result::Result<T, QuillError>;

/// Classification of a blob backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFailure {
    /// Backend could not be reached, timed out, or answered with a server error.
    Unreachable,
    /// Backend refused the write for capacity or rate reasons.
    QuotaExceeded,
    /// The payload or reference itself is unacceptable.
    InvalidPayload,
}

impl StorageFailure {
    pub fn name(&self) -> &'static str {
        match self {
            StorageFailure::Unreachable => "Unreachable",
            StorageFailure::QuotaExceeded => "QuotaExceeded",
            StorageFailure::InvalidPayload => "InvalidPayload",
        }
    }
}

/// Error classes surfaced by the post mutation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,             // 403
    Validation,               // 422
    NotFound,                 // 404
    Storage(StorageFailure),  // 503 / 507 / 400
    RecordStore,              // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 403,
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Storage(StorageFailure::Unreachable) => 503,
            ErrorKind::Storage(StorageFailure::QuotaExceeded) => 507,
            ErrorKind::Storage(StorageFailure::InvalidPayload) => 400,
            ErrorKind::RecordStore => 500,
        }
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Storage(_) => "StorageError",
            ErrorKind::RecordStore => "RecordStoreError",
        }
    }

    /// Error `className`, kebab-cased
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Validation => "validation-error",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Storage(StorageFailure::Unreachable) => "storage-unreachable",
            ErrorKind::Storage(StorageFailure::QuotaExceeded) => "storage-quota-exceeded",
            ErrorKind::Storage(StorageFailure::InvalidPayload) => "storage-invalid-payload",
            ErrorKind::RecordStore => "record-store-error",
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, ErrorKind::Storage(_))
    }
}

/// A structured Quill error.
///
/// Mirrors the shape the UI layer renders:
/// - name
/// - message
/// - code (HTTP-style status)
/// - class_name
/// - field (validation failures only)
#[derive(Debug)]
pub struct QuillError {
    pub kind: ErrorKind,
    pub message: String,
    pub field: Option<String>,
    pub source: Option<AnyError>,
}

impl QuillError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            source: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Downcast an `anyhow::Error` to a `QuillError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&QuillError> {
        err.downcast_ref::<QuillError>()
    }

    /// Turn any error into a QuillError:
    /// - if it's already a QuillError, keep it
    /// - otherwise wrap as RecordStore
    pub fn normalize(err: AnyError) -> QuillError {
        match err.downcast::<QuillError>() {
            Ok(quill) => quill,
            Err(other) => QuillError::new(ErrorKind::RecordStore, other.to_string()).with_source(other),
        }
    }

    /// Copy suitable for returning to clients: drops the inner `source`.
    pub fn sanitize_for_client(&self) -> QuillError {
        QuillError {
            kind: self.kind,
            message: self.message.clone(),
            field: self.field.clone(),
            source: None,
        }
    }

    // ---- Constructors ----

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }

    /// Validation failure naming the offending field.
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg).with_field(field)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn storage(failure: StorageFailure, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage(failure), msg)
    }

    pub fn record_store(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RecordStore, msg)
    }
}

impl fmt::Display for QuillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.field) {
            (ErrorKind::Storage(failure), _) => {
                write!(f, "{}::{} ({}): {}", self.name(), failure.name(), self.code(), self.message)
            }
            (_, Some(field)) => write!(f, "{} ({}) [{}]: {}", self.name(), self.code(), field, self.message),
            _ => write!(f, "{} ({}): {}", self.name(), self.code(), self.message),
        }
    }
}

impl std::error::Error for QuillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl QuillError {
    /// JSON payload for the UI layer.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let ErrorKind::Storage(failure) = self.kind {
            base["reason"] = json!(failure.name());
        }
        if let Some(field) = &self.field {
            base["field"] = json!(field);
        }
        base
    }
}

/// Convenience helper for "bail with QuillError".
#[macro_export]
macro_rules! bail_quill {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::QuillError::$ctor($msg))
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::QuillError::$ctor(format!($fmt, $($arg)*)))
    };
}
