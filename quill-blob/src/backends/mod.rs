//! Concrete storage backends.
//!
//! A deployment runs exactly one of these, chosen by `storage.backend`.

mod cdn;
mod local;
mod memory;
mod s3;

use std::sync::Arc;

pub use cdn::CdnImageStore;
pub use local::LocalFsStore;
pub use memory::MemoryBlobStore;
pub use s3::S3Store;

use crate::config::{BackendSettings, StorageSettings};
use crate::{BlobAdapter, BlobStore, StorageResult};

/// Build the configured backend and wrap it in an adapter.
pub async fn connect(settings: &StorageSettings) -> StorageResult<BlobAdapter> {
    let store: Arc<dyn BlobStore> = match &settings.backend {
        BackendSettings::Local { root, public_prefix } => {
            Arc::new(LocalFsStore::new(root.clone(), public_prefix.clone())?)
        }
        BackendSettings::Cdn(cdn) => Arc::new(CdnImageStore::new(cdn.clone())?),
        BackendSettings::S3(s3) => Arc::new(S3Store::connect(s3).await?),
        BackendSettings::Memory => Arc::new(MemoryBlobStore::new()),
    };

    tracing::info!(backend = %store.kind(), namespace = %settings.namespace, "Storage backend ready");
    Ok(BlobAdapter::from_shared(store, settings.blob.clone()))
}
