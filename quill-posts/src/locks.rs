use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::content::ContentId;

/// In-process per-post mutex, held across a whole update or delete.
///
/// Without it two concurrent updates of one post both read the same current
/// asset, both upload, and the record keeps whichever commits last; the
/// other upload is left unreferenced.
#[derive(Debug, Clone, Default)]
pub struct MutationLocks {
    locks: Arc<DashMap<ContentId, Arc<Mutex<()>>>>,
}

impl MutationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &ContentId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
