#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use quill_blob::{
    AssetPayload, AssetRef, BackendKind, BlobAdapter, BlobConfig, BlobStore, ByteStream, MemoryBlobStore, PutResult,
    StorageError, StorageResult,
};
use quill_core::{Actor, StorageFailure};
use quill_posts::{
    Content, ContentFields, ContentId, ContentRecordStore, ContentUpdate, MemoryContentStore, NewContent,
    PostsConfig, PostsService, RecordResult, RecordStoreError, RoleGate,
};

/// Consume one pending injected failure, if any.
fn take_failure(pending: &AtomicUsize) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Memory blob store that counts calls and fails on demand.
#[derive(Clone, Default)]
pub struct FaultyBlobStore {
    pub inner: MemoryBlobStore,
    puts: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    put_fault: Arc<Mutex<Option<StorageFailure>>>,
    fail_deletes: Arc<AtomicBool>,
    put_delay: Arc<Mutex<Option<Duration>>>,
}

impl FaultyBlobStore {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_puts_with(&self, failure: Option<StorageFailure>) {
        *self.put_fault.lock() = failure;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_puts(&self, delay: Duration) {
        *self.put_delay.lock() = Some(delay);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    async fn put(&self, key: &str, content_type: Option<&str>, stream: ByteStream) -> StorageResult<PutResult> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fault = *self.put_fault.lock();
        match fault {
            Some(StorageFailure::Unreachable) => Err(StorageError::unreachable("connection refused")),
            Some(StorageFailure::QuotaExceeded) => Err(StorageError::quota_exceeded("bucket full")),
            Some(StorageFailure::InvalidPayload) => Err(StorageError::invalid("rejected by backend")),
            None => self.inner.put(key, content_type, stream).await,
        }
    }

    async fn get(&self, reference: &str) -> StorageResult<Bytes> {
        self.inner.get(reference).await
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        self.inner.exists(reference).await
    }

    async fn delete(&self, reference: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::unreachable("delete timed out"));
        }
        self.inner.delete(reference).await
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

/// Memory record store that counts writes and fails on demand.
#[derive(Clone, Default)]
pub struct FaultyRecords {
    pub inner: MemoryContentStore,
    pub writes: Arc<AtomicUsize>,
    fail_creates: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicUsize>,
    fail_deletes: Arc<AtomicUsize>,
    stall_creates: Arc<AtomicBool>,
    stall_updates: Arc<AtomicBool>,
}

impl FaultyRecords {
    /// Make `create` hang forever, like a write that never acknowledges.
    pub fn stall_creates(&self, stall: bool) {
        self.stall_creates.store(stall, Ordering::SeqCst);
    }

    pub fn stall_updates(&self, stall: bool) {
        self.stall_updates.store(stall, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentRecordStore for FaultyRecords {
    async fn create(&self, new: NewContent) -> RecordResult<Content> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_creates) {
            return Err(RecordStoreError::backend("insert failed: connection reset"));
        }
        if self.stall_creates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.create(new).await
    }

    async fn get(&self, id: &ContentId) -> RecordResult<Content> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &ContentId, update: ContentUpdate) -> RecordResult<Content> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_updates) {
            return Err(RecordStoreError::backend("update failed: deadlock detected"));
        }
        if self.stall_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &ContentId) -> RecordResult<Content> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_deletes) {
            return Err(RecordStoreError::backend("delete failed: lock timeout"));
        }
        self.inner.delete(id).await
    }

    async fn list(&self) -> RecordResult<Vec<Content>> {
        self.inner.list().await
    }
}

pub struct Harness {
    pub service: PostsService,
    pub blobs: FaultyBlobStore,
    pub records: FaultyRecords,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PostsConfig::default(), BlobConfig::default())
    }

    pub fn with_config(config: PostsConfig, blob_config: BlobConfig) -> Self {
        let blobs = FaultyBlobStore::default();
        let records = FaultyRecords::default();
        let service = PostsService::new(
            Arc::new(records.clone()),
            Arc::new(BlobAdapter::new(blobs.clone(), blob_config)),
            Arc::new(RoleGate::default()),
            config,
        );
        Self {
            service,
            blobs,
            records,
        }
    }

    /// Create a post as admin.
    pub async fn seed(&self, payload: Option<AssetPayload>) -> Content {
        self.service
            .create_content(fields(), payload, &admin())
            .await
            .expect("seed post")
    }

    pub async fn asset_exists(&self, reference: &AssetRef) -> bool {
        self.service.blobs().exists(reference).await.unwrap()
    }

    pub async fn stored(&self, id: &ContentId) -> Content {
        self.records.inner.get(id).await.unwrap()
    }
}

pub fn admin() -> Actor {
    Actor::new("admin-1", "ADMIN")
}

pub fn reader() -> Actor {
    Actor::new("reader-1", "USER")
}

pub fn fields() -> ContentFields {
    ContentFields::new("A", "d", "b")
}

pub fn image(name: &str, data: &'static [u8]) -> AssetPayload {
    AssetPayload::from_bytes(name.to_string(), data)
}
