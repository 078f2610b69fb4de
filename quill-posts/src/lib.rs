//! # quill-posts: blog posts with coordinated image assets
//!
//! [`PostsService`] keeps each post record and its image consistent while
//! the image lives in a separate blob backend. Mutations follow one order:
//!
//! 1. upload the new image (if any)
//! 2. commit the record
//! 3. delete the image it replaced
//!
//! A failed record write deletes the fresh upload; a failed delete is logged
//! and kept in the [`OrphanLedger`] for a later [`PostsService::sweep_orphans`].
//!
//! ```rust
//! use std::sync::Arc;
//! use quill_blob::{AssetPayload, BlobAdapter, BlobConfig, MemoryBlobStore};
//! use quill_core::Actor;
//! use quill_posts::{ContentFields, MemoryContentStore, PostsConfig, PostsService, RoleGate};
//!
//! # #[tokio::main]
//! # async fn main() -> quill_core::QuillResult<()> {
//! let service = PostsService::new(
//!     Arc::new(MemoryContentStore::new()),
//!     Arc::new(BlobAdapter::new(MemoryBlobStore::new(), BlobConfig::default())),
//!     Arc::new(RoleGate::default()),
//!     PostsConfig::default(),
//! );
//!
//! let admin = Actor::new("u1", "ADMIN");
//! let post = service
//!     .create_content(
//!         ContentFields::new("A", "d", "b"),
//!         Some(AssetPayload::from_bytes("cover.png", &b"png"[..])),
//!         &admin,
//!     )
//!     .await?;
//! assert!(post.asset_ref.is_some());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod content;
pub mod lifecycle;
pub mod locks;
pub mod orphans;
pub mod outcome;
pub mod record_store;
pub mod service;

pub use auth::{AuthorizationGate, RoleGate, DEFAULT_ADMIN_ROLE};
pub use config::{PostsConfig, DEFAULT_FALLBACK_ASSET};
pub use content::{Content, ContentChanges, ContentFields, ContentId, ContentUpdate, NewContent};
pub use lifecycle::{AssetCleanup, AssetLifecycleManager, PreparedCreate, PreparedUpdate};
pub use locks::MutationLocks;
pub use orphans::{OrphanLedger, OrphanRecord, SweepReport};
pub use outcome::MutationOutcome;
pub use record_store::{ContentRecordStore, MemoryContentStore, RecordResult, RecordStoreError};
pub use service::PostsService;
