use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use quill_core::QuillError;
use thiserror::Error;

use crate::content::{Content, ContentId, ContentUpdate, NewContent};

pub type RecordResult<T> = Result<T, RecordStoreError>;

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("Content not found: {0}")]
    NotFound(ContentId),

    #[error("Record conflict: {0}")]
    Conflict(String),

    #[error("Record store failure: {0}")]
    Backend(String),
}

impl RecordStoreError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend(message.into())
    }
}

impl From<RecordStoreError> for QuillError {
    fn from(err: RecordStoreError) -> Self {
        let message = err.to_string();
        if matches!(err, RecordStoreError::NotFound(_)) {
            QuillError::not_found(message).with_source(err)
        } else {
            QuillError::record_store(message).with_source(err)
        }
    }
}

/// Persistence for post records, keyed by content id.
///
/// Implementations assign ids and timestamps on `create`.
#[async_trait]
pub trait ContentRecordStore: Send + Sync {
    async fn create(&self, new: NewContent) -> RecordResult<Content>;

    /// `RecordStoreError::NotFound` when no such record exists.
    async fn get(&self, id: &ContentId) -> RecordResult<Content>;

    async fn update(&self, id: &ContentId, update: ContentUpdate) -> RecordResult<Content>;

    /// Remove a record, returning it as it was at removal.
    async fn delete(&self, id: &ContentId) -> RecordResult<Content>;

    async fn list(&self) -> RecordResult<Vec<Content>>;
}

/// In-memory record store for tests and development.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    records: Arc<RwLock<HashMap<ContentId, Content>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ContentRecordStore for MemoryContentStore {
    async fn create(&self, new: NewContent) -> RecordResult<Content> {
        let now = Utc::now();
        let content = Content {
            id: ContentId::generate(),
            title: new.fields.title,
            description: new.fields.description,
            body: new.fields.body,
            asset_ref: new.asset_ref,
            author_id: new.author_id,
            created_at: now,
            updated_at: now,
        };

        let mut records = self.records.write();
        if records.contains_key(&content.id) {
            return Err(RecordStoreError::Conflict(format!("id {} already taken", content.id)));
        }
        records.insert(content.id.clone(), content.clone());
        Ok(content)
    }

    async fn get(&self, id: &ContentId) -> RecordResult<Content> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &ContentId, update: ContentUpdate) -> RecordResult<Content> {
        let mut records = self.records.write();
        let content = records
            .get_mut(id)
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))?;
        update.apply_to(content);
        content.updated_at = Utc::now();
        Ok(content.clone())
    }

    async fn delete(&self, id: &ContentId) -> RecordResult<Content> {
        self.records
            .write()
            .remove(id)
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))
    }

    async fn list(&self) -> RecordResult<Vec<Content>> {
        let mut all: Vec<Content> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
