use std::collections::HashSet;
use std::sync::Arc;

use quill_blob::{AssetPayload, BlobAdapter, StorageSettings};
use quill_core::{Actor, QuillConfigSnapshot, QuillError, QuillResult};
use tokio::sync::OwnedMutexGuard;

use crate::auth::{AuthorizationGate, RoleGate};
use crate::config::PostsConfig;
use crate::content::{Content, ContentChanges, ContentFields, ContentId, ContentUpdate, NewContent};
use crate::lifecycle::AssetLifecycleManager;
use crate::locks::MutationLocks;
use crate::orphans::{OrphanLedger, SweepReport};
use crate::record_store::ContentRecordStore;

/// Entry points for post mutations and reads.
///
/// Each mutation runs gate, validation, asset preparation and the record
/// write in that order, and compensates on the asset side when the record
/// write fails. The caller always receives the original failure.
pub struct PostsService {
    records: Arc<dyn ContentRecordStore>,
    gate: Arc<dyn AuthorizationGate>,
    assets: AssetLifecycleManager,
    locks: Option<MutationLocks>,
    config: PostsConfig,
}

impl PostsService {
    pub fn new(
        records: Arc<dyn ContentRecordStore>,
        blobs: Arc<BlobAdapter>,
        gate: Arc<dyn AuthorizationGate>,
        config: PostsConfig,
    ) -> Self {
        let assets = AssetLifecycleManager::new(blobs, config.namespace.clone(), OrphanLedger::new());
        let locks = config.serialize_mutations.then(MutationLocks::new);
        Self {
            records,
            gate,
            assets,
            locks,
            config,
        }
    }

    /// Wire a service from configuration: the `storage.*` backend and a
    /// [`RoleGate`] for `posts.adminRole`.
    pub async fn from_config(
        records: Arc<dyn ContentRecordStore>,
        config: &QuillConfigSnapshot,
    ) -> QuillResult<Self> {
        let storage = StorageSettings::from_config(config)?;
        let blobs = quill_blob::connect(&storage).await?;
        let mut posts = PostsConfig::from_config(config);
        posts.namespace = storage.namespace;
        let gate = RoleGate::new(posts.admin_role.clone());
        Ok(Self::new(records, Arc::new(blobs), Arc::new(gate), posts))
    }

    pub fn config(&self) -> &PostsConfig {
        &self.config
    }

    pub fn blobs(&self) -> &Arc<BlobAdapter> {
        self.assets.blobs()
    }

    pub fn orphans(&self) -> &OrphanLedger {
        self.assets.orphans()
    }

    /// Retry deletes that failed or were abandoned during earlier mutations.
    ///
    /// Assets that a stored post still references are released from the
    /// ledger instead of deleted.
    pub async fn sweep_orphans(&self) -> QuillResult<SweepReport> {
        let in_use: HashSet<_> = self
            .records
            .list()
            .await?
            .into_iter()
            .filter_map(|content| content.asset_ref)
            .collect();
        Ok(self.orphans().sweep_unreferenced(self.blobs(), &in_use).await)
    }

    /// Image to render for a post.
    pub fn display_asset<'a>(&'a self, content: &'a Content) -> &'a str {
        content.display_asset(&self.config.fallback_asset)
    }

    #[tracing::instrument(skip(self, fields, payload, actor), fields(actor = %actor.id))]
    pub async fn create_content(
        &self,
        fields: ContentFields,
        payload: Option<AssetPayload>,
        actor: &Actor,
    ) -> QuillResult<Content> {
        self.authorize(actor, "create")?;
        fields.validate()?;

        let prepared = self.assets.prepare_for_create(payload).await?;
        let new = NewContent {
            fields,
            asset_ref: prepared.asset_ref().cloned(),
            author_id: actor.id.clone(),
        };

        match self.records.create(new).await {
            Ok(content) => {
                let asset = prepared.commit();
                tracing::info!(id = %content.id, ?asset, "Created post");
                Ok(content)
            }
            Err(err) => {
                prepared.rollback().await;
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self, changes, payload, actor), fields(actor = %actor.id))]
    pub async fn update_content(
        &self,
        id: &ContentId,
        changes: ContentChanges,
        payload: Option<AssetPayload>,
        actor: &Actor,
    ) -> QuillResult<Content> {
        self.authorize(actor, "update")?;
        changes.validate()?;

        let result = {
            let _guard = self.lock(id).await;
            self.apply_update(id, changes, payload).await
        };
        self.prune_locks();
        result
    }

    async fn apply_update(
        &self,
        id: &ContentId,
        changes: ContentChanges,
        payload: Option<AssetPayload>,
    ) -> QuillResult<Content> {
        let current = self.records.get(id).await?;

        let prepared = self
            .assets
            .prepare_for_update(current.asset_ref.as_ref(), payload)
            .await?;
        let update = ContentUpdate {
            changes,
            asset_ref: prepared.replacement().cloned(),
        };

        match self.records.update(id, update).await {
            Ok(content) => {
                prepared.commit().await;
                tracing::info!(%id, asset = ?content.asset_ref, "Updated post");
                Ok(content)
            }
            Err(err) => {
                prepared.rollback().await;
                Err(err.into())
            }
        }
    }

    /// Delete a post, then its asset. A failed record delete leaves the asset alone.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_content(&self, id: &ContentId, actor: &Actor) -> QuillResult<Content> {
        self.authorize(actor, "delete")?;

        let result = {
            let _guard = self.lock(id).await;
            self.apply_delete(id).await
        };
        self.prune_locks();
        let removed = result?;
        tracing::info!(%id, "Deleted post");
        Ok(removed)
    }

    async fn apply_delete(&self, id: &ContentId) -> QuillResult<Content> {
        self.records.get(id).await?;
        let removed = self.records.delete(id).await?;
        self.assets.prepare_for_delete(removed.asset_ref.as_ref()).run().await;
        Ok(removed)
    }

    /// Any signed-in actor may read.
    pub async fn get_content(&self, id: &ContentId, actor: &Actor) -> QuillResult<Content> {
        tracing::debug!(%id, actor = %actor.id, "Reading post");
        Ok(self.records.get(id).await?)
    }

    /// All posts, newest first.
    pub async fn list_content(&self, actor: &Actor) -> QuillResult<Vec<Content>> {
        tracing::debug!(actor = %actor.id, "Listing posts");
        let mut all = self.records.list().await?;
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    fn authorize(&self, actor: &Actor, action: &str) -> QuillResult<()> {
        if self.gate.is_authorized(actor) {
            return Ok(());
        }
        tracing::info!(actor = %actor.id, action, "Rejected unauthorized mutation");
        Err(QuillError::unauthorized(format!("{} may not {action} posts", actor.id)))
    }

    /// Live per-post lock entries; `None` when mutations are not serialized.
    pub fn lock_count(&self) -> Option<usize> {
        self.locks.as_ref().map(MutationLocks::len)
    }

    fn prune_locks(&self) {
        if let Some(locks) = &self.locks {
            locks.prune();
        }
    }

    async fn lock(&self, id: &ContentId) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(id).await),
            None => None,
        }
    }
}
