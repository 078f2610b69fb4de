use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Unique suffix minted for every stored blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl BlobId {
    /// Generate a new random blob ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a stored asset: a public path, a CDN URL or an object URI.
///
/// The same value is persisted on the post record and handed back to the
/// backend for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self(reference.into())
    }

    /// `None` for blank references, which mean "no asset".
    pub fn parse<S: Into<String>>(reference: S) -> Option<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            None
        } else {
            Some(Self(reference))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a successful `put`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAsset {
    pub reference: AssetRef,
    pub key: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub filename: String,
    pub etag: Option<String>,
    pub created_at: i64,
}

/// Which physical backend a store talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    LocalFs,
    Cdn,
    S3,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalFs => "local",
            BackendKind::Cdn => "cdn",
            BackendKind::S3 => "s3",
            BackendKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
