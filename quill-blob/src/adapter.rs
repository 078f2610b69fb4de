use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::store::normalize_namespace;
use crate::{
    AssetPayload, AssetRef, BackendKind, BlobConfig, BlobId, BlobKeyStrategy, BlobStore, DefaultKeyStrategy,
    StorageError, StorageResult, StoredAsset,
};

/// The main blob adapter - this is what the post service embeds
///
/// Wraps whichever backend the deployment runs so callers never branch on
/// the backend kind.
#[derive(Clone)]
pub struct BlobAdapter {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobConfig,
}

impl std::fmt::Debug for BlobAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobAdapter")
            .field("backend", &self.store.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl BlobAdapter {
    /// Create a new blob adapter
    pub fn new<S: BlobStore + 'static>(store: S, config: BlobConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    pub fn from_shared(store: Arc<dyn BlobStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    /// Replace the default key strategy
    pub fn with_key_strategy<K: BlobKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.store.kind()
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Store a payload under a fresh key in `namespace`.
    ///
    /// Every call mints a new key, so a put never replaces an existing asset.
    /// The payload is consumed; a spooled temporary file is removed whatever
    /// the outcome.
    #[tracing::instrument(
        skip(self, payload),
        fields(backend = %self.store.kind(), filename = %payload.filename(), size_bytes = payload.size_bytes())
    )]
    pub async fn put(&self, payload: AssetPayload, namespace: &str) -> StorageResult<StoredAsset> {
        let size = payload.size_bytes();
        if size == 0 {
            return Err(StorageError::invalid("asset is empty"));
        }
        if size > self.config.max_blob_bytes {
            return Err(StorageError::invalid(format!(
                "Blob size {} exceeds maximum {}",
                size, self.config.max_blob_bytes
            )));
        }
        if let Some(limit) = payload.max_bytes() {
            if size > limit {
                return Err(StorageError::invalid(format!("Blob size {size} exceeds upload limit {limit}")));
            }
        }

        let namespace = normalize_namespace(namespace)
            .ok_or_else(|| StorageError::invalid(format!("invalid namespace '{namespace}'")))?;

        let blob_id = BlobId::new();
        let key = self.keys.object_key(&namespace, blob_id.as_str(), payload.filename());
        let content_type = payload.content_type().map(str::to_string);
        let filename = payload.filename().to_string();

        let result = self
            .bounded("put", self.store.put(&key, content_type.as_deref(), payload.into_stream()))
            .await?;

        tracing::info!(reference = %result.reference, "Stored asset");

        Ok(StoredAsset {
            reference: AssetRef::new(result.reference),
            key,
            size_bytes: result.size_bytes,
            content_type,
            filename,
            etag: result.etag,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Delete an asset. Succeeds when it is already gone.
    #[tracing::instrument(skip(self), fields(backend = %self.store.kind()))]
    pub async fn delete(&self, reference: &AssetRef) -> StorageResult<()> {
        self.bounded("delete", self.store.delete(reference.as_str())).await
    }

    pub async fn fetch(&self, reference: &AssetRef) -> StorageResult<Bytes> {
        self.bounded("fetch", self.store.get(reference.as_str())).await
    }

    pub async fn exists(&self, reference: &AssetRef) -> StorageResult<bool> {
        self.bounded("exists", self.store.exists(reference.as_str())).await
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                tracing::warn!(op, ?limit, "Storage operation timed out");
                StorageError::unreachable(format!("{op} timed out after {limit:?}"))
            })?,
            None => fut.await,
        }
    }
}
