use async_trait::async_trait;
use bytes::Bytes;
use chrono::Datelike;

use crate::{BackendKind, ByteStream, StorageResult};

/// Core blob storage operations - must be implemented by all storage backends
///
/// References passed to `get`, `exists` and `delete` are the ones a previous
/// `put` returned on the same backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob under `key`. Must fail rather than replace an existing object.
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        stream: ByteStream,
    ) -> StorageResult<PutResult>;

    /// Read a whole blob; `StorageError::NotFound` when absent.
    async fn get(&self, reference: &str) -> StorageResult<Bytes>;

    async fn exists(&self, reference: &str) -> StorageResult<bool>;

    /// Delete a blob. Deleting something already gone succeeds.
    async fn delete(&self, reference: &str) -> StorageResult<()>;

    fn kind(&self) -> BackendKind;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub reference: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
}

/// Strategy for generating blob keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Generate a key for a blob
    fn object_key(&self, namespace: &str, blob_id: &str, filename: &str) -> String;
}

/// Default key strategy: namespace/year/month/{blob_id}-{name}.{ext}
#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, namespace: &str, blob_id: &str, filename: &str) -> String {
        let now = chrono::Utc::now();
        let (stem, ext) = sanitize_filename(filename);

        let name = match ext {
            Some(ext) => format!("{}-{}.{}", blob_id, stem, ext),
            None => format!("{}-{}", blob_id, stem),
        };

        format!("{}/{:04}/{:02}/{}", namespace, now.year(), now.month(), name)
    }
}

const MAX_STEM_LEN: usize = 64;
const MAX_EXT_LEN: usize = 8;

/// Reduce a client-supplied filename to a safe `(stem, extension)` pair.
///
/// Directory components are dropped, the stem keeps `[A-Za-z0-9_-]` (other
/// runs collapse to a single `-`), and the extension is lowercase ASCII
/// alphanumerics.
pub fn sanitize_filename(filename: &str) -> (String, Option<String>) {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let (raw_stem, raw_ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };

    let mut stem = String::with_capacity(raw_stem.len());
    for ch in raw_stem.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            stem.push(ch);
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let mut stem = stem.trim_matches('-').to_string();
    stem.truncate(MAX_STEM_LEN);
    if stem.is_empty() {
        stem = "asset".to_string();
    }

    let ext = raw_ext
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= MAX_EXT_LEN && e.chars().all(|c| c.is_ascii_alphanumeric()));

    (stem, ext)
}

/// Normalize a namespace prefix: lowercase segments of `[a-z0-9_-]`, no empty segments.
pub fn normalize_namespace(namespace: &str) -> Option<String> {
    let segments: Vec<String> = namespace
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let valid = !segments.is_empty()
        && segments.iter().all(|s| {
            s != "." && s != ".." && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });

    valid.then(|| segments.join("/"))
}
