//! # quill-blob: image storage for Quill posts
//!
//! One [`BlobAdapter`] fronts whichever backend the deployment runs: the
//! local filesystem, a CDN image service or an S3-compatible bucket. Callers
//! hand it an [`AssetPayload`] and get back an opaque [`AssetRef`] to persist
//! on the post; the same reference is later handed back for deletion.
//!
//! ```text
//! ┌─────────────────┐
//! │  PostsService   │  ← record/asset ordering
//! ├─────────────────┤
//! │   BlobAdapter   │  ← validation, keys, timeouts
//! ├─────────────────┤
//! │   BlobStore     │  ← local / cdn / s3 / memory
//! └─────────────────┘
//! ```
//!
//! Guarantees every backend upholds:
//!
//! - `put` never replaces an existing object; each call gets a fresh key.
//! - `delete` of an absent object succeeds.
//! - failures surface as [`StorageError`] classed `Unreachable`,
//!   `QuotaExceeded` or `InvalidPayload`.
//!
//! ```rust
//! use quill_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> StorageResult<()> {
//! let adapter = BlobAdapter::new(MemoryBlobStore::new(), BlobConfig::default());
//! let stored = adapter.put(AssetPayload::from_bytes("cover.png", &b"png"[..]), "blogs").await?;
//! adapter.delete(&stored.reference).await?;
//! adapter.delete(&stored.reference).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backends;
mod config;
mod error;
mod payload;
pub mod store;
mod types;

pub use adapter::BlobAdapter;
pub use backends::{connect, CdnImageStore, LocalFsStore, MemoryBlobStore, S3Store};
pub use config::{
    BackendSettings, BlobConfig, CdnSettings, S3Settings, StorageSettings, DEFAULT_CDN_API_BASE,
    DEFAULT_LOCAL_ROOT, DEFAULT_NAMESPACE, DEFAULT_PUBLIC_PREFIX,
};
pub use error::{StorageError, StorageResult};
pub use payload::{guess_content_type, AssetPayload, PayloadBody, TempUpload};
pub use store::{BlobKeyStrategy, BlobStore, DefaultKeyStrategy, PutResult};
pub use types::{AssetRef, BackendKind, BlobId, ByteStream, StoredAsset};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AssetPayload, AssetRef, BlobAdapter, BlobConfig, BlobStore, ByteStream, MemoryBlobStore, StorageError,
        StorageResult, StoredAsset,
    };
}
