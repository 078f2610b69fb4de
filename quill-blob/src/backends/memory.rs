use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::RwLock;

use crate::{BackendKind, BlobStore, ByteStream, PutResult, StorageError, StorageResult};

const SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

/// In-memory backend for testing and development
///
/// Clones share the same objects, so a test can keep a handle after moving
/// the store into an adapter.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// References of every stored object, sorted.
    pub fn references(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.objects.read().keys().map(|k| format!("{SCHEME}{k}")).collect();
        refs.sort();
        refs
    }

    pub fn content_type(&self, reference: &str) -> Option<String> {
        let key = reference.strip_prefix(SCHEME)?;
        self.objects.read().get(key).and_then(|o| o.content_type.clone())
    }

    fn key_for<'a>(&self, reference: &'a str) -> StorageResult<&'a str> {
        reference
            .strip_prefix(SCHEME)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StorageError::invalid(format!("not a memory reference: {reference}")))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        mut stream: ByteStream,
    ) -> StorageResult<PutResult> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::from_io(e, "read upload stream"))?;
            buf.extend_from_slice(&chunk);
        }
        let data = buf.freeze();
        let size_bytes = data.len() as u64;

        let mut objects = self.objects.write();
        if objects.contains_key(key) {
            return Err(StorageError::invalid(format!("object already exists at {key}")));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );

        Ok(PutResult {
            reference: format!("{SCHEME}{key}"),
            size_bytes,
            etag: None,
        })
    }

    async fn get(&self, reference: &str) -> StorageResult<Bytes> {
        let key = self.key_for(reference)?;
        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(reference))
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let key = self.key_for(reference)?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn delete(&self, reference: &str) -> StorageResult<()> {
        let key = self.key_for(reference)?;
        self.objects.write().remove(key);
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}
