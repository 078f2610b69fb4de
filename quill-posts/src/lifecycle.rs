//! Ordering of asset writes around record writes.
//!
//! Every mutation follows upload-new, commit-record, delete-old. The only
//! failure window this leaves is a new asset uploaded while the old one is
//! not yet deleted: an orphan, recorded in the [`OrphanLedger`] when its
//! delete fails. A record never points at a missing blob.

use std::sync::Arc;

use quill_blob::{AssetPayload, AssetRef, BlobAdapter};
use quill_core::{QuillError, QuillResult};

use crate::orphans::OrphanLedger;

/// Decides what to upload and what to delete for each mutation.
#[derive(Debug, Clone)]
pub struct AssetLifecycleManager {
    blobs: Arc<BlobAdapter>,
    namespace: String,
    orphans: OrphanLedger,
}

impl AssetLifecycleManager {
    pub fn new<S: Into<String>>(blobs: Arc<BlobAdapter>, namespace: S, orphans: OrphanLedger) -> Self {
        Self {
            blobs,
            namespace: namespace.into(),
            orphans,
        }
    }

    pub fn blobs(&self) -> &Arc<BlobAdapter> {
        &self.blobs
    }

    pub fn orphans(&self) -> &OrphanLedger {
        &self.orphans
    }

    /// Upload the payload of a new post, if any.
    pub async fn prepare_for_create(&self, payload: Option<AssetPayload>) -> QuillResult<PreparedCreate> {
        let Some(payload) = payload else {
            return Ok(PreparedCreate {
                asset_ref: None,
                rollback: AssetCleanup::none(),
            });
        };

        let stored = self.blobs.put(payload, &self.namespace).await.map_err(QuillError::from)?;
        Ok(PreparedCreate {
            rollback: self.cleanup(stored.reference.clone(), "create rollback", true),
            asset_ref: Some(stored.reference),
        })
    }

    /// Upload a replacement asset, if any, deferring removal of `current`.
    ///
    /// A failed upload leaves `current` untouched and the record must not be
    /// updated.
    pub async fn prepare_for_update(
        &self,
        current: Option<&AssetRef>,
        payload: Option<AssetPayload>,
    ) -> QuillResult<PreparedUpdate> {
        let Some(payload) = payload else {
            return Ok(PreparedUpdate {
                current: current.cloned(),
                replacement: None,
                cleanup: AssetCleanup::none(),
                rollback: AssetCleanup::none(),
            });
        };

        let stored = self.blobs.put(payload, &self.namespace).await.map_err(QuillError::from)?;
        Ok(PreparedUpdate {
            cleanup: match current {
                Some(old) => self.cleanup(old.clone(), "superseded asset", false),
                None => AssetCleanup::none(),
            },
            rollback: self.cleanup(stored.reference.clone(), "update rollback", true),
            current: current.cloned(),
            replacement: Some(stored.reference),
        })
    }

    /// Removal of a deleted post's asset; run only after the record delete commits.
    pub fn prepare_for_delete(&self, current: Option<&AssetRef>) -> AssetCleanup {
        match current {
            Some(asset) => self.cleanup(asset.clone(), "deleted post", true),
            None => AssetCleanup::none(),
        }
    }

    fn cleanup(&self, reference: AssetRef, purpose: &'static str, owed: bool) -> AssetCleanup {
        AssetCleanup {
            pending: Some(PendingDelete {
                reference,
                purpose,
                blobs: self.blobs.clone(),
                orphans: self.orphans.clone(),
            }),
            owed,
        }
    }
}

/// Asset side of a create, awaiting the record insert.
#[derive(Debug)]
#[must_use = "a prepared create must be committed or rolled back"]
pub struct PreparedCreate {
    asset_ref: Option<AssetRef>,
    rollback: AssetCleanup,
}

impl PreparedCreate {
    pub fn asset_ref(&self) -> Option<&AssetRef> {
        self.asset_ref.as_ref()
    }

    /// The record now owns the asset.
    pub fn commit(self) -> Option<AssetRef> {
        self.rollback.disarm();
        self.asset_ref
    }

    /// The record insert failed: delete the fresh upload.
    pub async fn rollback(self) {
        self.rollback.run().await;
    }
}

/// Asset side of an update, awaiting the record update.
#[derive(Debug)]
#[must_use = "a prepared update must be committed or rolled back"]
pub struct PreparedUpdate {
    current: Option<AssetRef>,
    replacement: Option<AssetRef>,
    cleanup: AssetCleanup,
    rollback: AssetCleanup,
}

impl PreparedUpdate {
    /// Reference the record should hold after the update.
    pub fn new_ref(&self) -> Option<&AssetRef> {
        self.replacement.as_ref().or(self.current.as_ref())
    }

    /// The freshly uploaded asset, when the update replaces the image.
    pub fn replacement(&self) -> Option<&AssetRef> {
        self.replacement.as_ref()
    }

    pub fn replaces_asset(&self) -> bool {
        self.replacement.is_some()
    }

    /// The record update committed: delete the superseded asset.
    pub async fn commit(self) {
        self.rollback.disarm();
        self.cleanup.owe().run().await;
    }

    /// The record update failed: delete the new upload, keep the old asset.
    pub async fn rollback(self) {
        self.cleanup.disarm();
        self.rollback.run().await;
    }
}

#[derive(Debug)]
struct PendingDelete {
    reference: AssetRef,
    purpose: &'static str,
    blobs: Arc<BlobAdapter>,
    orphans: OrphanLedger,
}

/// A deferred asset delete.
///
/// Running it never fails: a backend error is logged and the reference is
/// recorded as an orphan, so compensation cannot mask the mutation's own
/// result.
///
/// An owed cleanup that is dropped before its delete finishes, because the
/// mutation future was cancelled, records the reference as an orphan too.
/// The superseded asset of an update is only owed once the record update
/// commits; until then the record still points at it.
#[derive(Debug)]
#[must_use = "an asset cleanup does nothing unless run"]
pub struct AssetCleanup {
    pending: Option<PendingDelete>,
    owed: bool,
}

impl AssetCleanup {
    pub fn none() -> Self {
        Self {
            pending: None,
            owed: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pending.is_none()
    }

    pub fn target(&self) -> Option<&AssetRef> {
        self.pending.as_ref().map(|p| &p.reference)
    }

    /// Drop without deleting anything.
    pub fn disarm(mut self) {
        self.pending = None;
    }

    fn owe(mut self) -> Self {
        self.owed = true;
        self
    }

    pub async fn run(mut self) {
        self.owed = true;
        let Some(pending) = self.pending.as_ref() else {
            return;
        };

        match pending.blobs.delete(&pending.reference).await {
            Ok(()) => tracing::debug!(reference = %pending.reference, purpose = pending.purpose, "Deleted asset"),
            Err(err) => {
                tracing::warn!(
                    reference = %pending.reference,
                    purpose = pending.purpose,
                    error = %err,
                    "Compensating asset delete failed, recorded as orphan"
                );
                pending.orphans.record(pending.reference.clone(), err.to_string());
            }
        }
        self.pending = None;
    }
}

impl Drop for AssetCleanup {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if !self.owed {
            return;
        }
        tracing::warn!(
            reference = %pending.reference,
            purpose = pending.purpose,
            "Asset cleanup abandoned, recorded as orphan"
        );
        pending.orphans.record(pending.reference, "cleanup abandoned before it completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_blob::{BlobConfig, MemoryBlobStore};
    use quill_core::{ErrorKind, StorageFailure};

    fn manager() -> (MemoryBlobStore, AssetLifecycleManager) {
        let store = MemoryBlobStore::new();
        let blobs = Arc::new(BlobAdapter::new(store.clone(), BlobConfig::default()));
        (store, AssetLifecycleManager::new(blobs, "blogs", OrphanLedger::new()))
    }

    #[tokio::test]
    async fn create_without_payload_has_no_asset() {
        let (store, assets) = manager();
        let prepared = assets.prepare_for_create(None).await.unwrap();
        assert!(prepared.asset_ref().is_none());
        assert!(prepared.commit().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn create_rollback_deletes_upload() {
        let (store, assets) = manager();
        let prepared = assets
            .prepare_for_create(Some(AssetPayload::from_bytes("a.png", "abc")))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        prepared.rollback().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_without_payload_keeps_current() {
        let (store, assets) = manager();
        let current = AssetRef::new("memory://blogs/old.png");
        let prepared = assets.prepare_for_update(Some(&current), None).await.unwrap();
        assert_eq!(prepared.new_ref(), Some(&current));
        assert!(!prepared.replaces_asset());
        prepared.commit().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_commit_and_rollback_touch_opposite_assets() {
        let (store, assets) = manager();
        let old = assets
            .prepare_for_create(Some(AssetPayload::from_bytes("old.png", "old")))
            .await
            .unwrap()
            .commit()
            .unwrap();

        let prepared = assets
            .prepare_for_update(Some(&old), Some(AssetPayload::from_bytes("new.png", "new")))
            .await
            .unwrap();
        let new = prepared.replacement().cloned().unwrap();
        prepared.rollback().await;
        assert_eq!(store.references(), vec![old.to_string()]);

        let prepared = assets
            .prepare_for_update(Some(&old), Some(AssetPayload::from_bytes("new.png", "new")))
            .await
            .unwrap();
        let new2 = prepared.replacement().cloned().unwrap();
        assert_ne!(new, new2);
        prepared.commit().await;
        assert_eq!(store.references(), vec![new2.to_string()]);
    }

    #[tokio::test]
    async fn failed_upload_surfaces_storage_error() {
        let (store, assets) = manager();
        let err = assets
            .prepare_for_update(None, Some(AssetPayload::from_bytes("empty.png", Vec::new())))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage(StorageFailure::InvalidPayload));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn abandoned_rollback_is_ledgered() {
        let (store, assets) = manager();
        let old = AssetRef::new("memory://blogs/old.png");
        let prepared = assets
            .prepare_for_update(Some(&old), Some(AssetPayload::from_bytes("new.png", "new")))
            .await
            .unwrap();
        let new = prepared.replacement().cloned().unwrap();

        // Dropped as a cancelled mutation would drop it
        drop(prepared);

        let pending = assets.orphans().pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reference, new);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_cleanup_is_ledgered() {
        let (_store, assets) = manager();
        assets
            .prepare_for_delete(Some(&AssetRef::new("https://elsewhere.example.com/a.png")))
            .run()
            .await;
        assert_eq!(assets.orphans().len(), 1);
        assert!(assets.prepare_for_delete(None).is_noop());
    }
}
