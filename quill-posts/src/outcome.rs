use quill_core::{ErrorKind, QuillResult};
use serde::Serialize;

use crate::content::Content;

/// Result of a post mutation as handed to the UI layer.
///
/// Serializes to `{"ok": {...}}` or `{"error": "StorageError", "detail": "...", ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MutationOutcome {
    Ok {
        ok: Content,
    },
    Error {
        error: &'static str,
        detail: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl MutationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, MutationOutcome::Ok { .. })
    }
}

impl From<QuillResult<Content>> for MutationOutcome {
    fn from(result: QuillResult<Content>) -> Self {
        match result {
            Ok(content) => MutationOutcome::Ok { ok: content },
            Err(err) => {
                let err = err.sanitize_for_client();
                MutationOutcome::Error {
                    error: err.name(),
                    reason: match err.kind {
                        ErrorKind::Storage(failure) => Some(failure.name()),
                        _ => None,
                    },
                    detail: err.message,
                    field: err.field,
                }
            }
        }
    }
}
