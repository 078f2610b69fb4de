//! Assets whose compensating delete failed.
//!
//! A failed cleanup never fails the mutation that scheduled it; the reference
//! lands here instead so an operator (or a periodic job) can retry it with
//! [`OrphanLedger::sweep`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quill_blob::{AssetRef, BlobAdapter};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanRecord {
    pub reference: AssetRef,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of one [`OrphanLedger::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: Vec<AssetRef>,
    pub remaining: usize,
}

/// Shared list of orphaned asset references. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct OrphanLedger {
    entries: Arc<Mutex<Vec<OrphanRecord>>>,
}

impl OrphanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<S: Into<String>>(&self, reference: AssetRef, reason: S) {
        self.entries.lock().push(OrphanRecord {
            reference,
            reason: reason.into(),
            recorded_at: Utc::now(),
        });
    }

    pub fn pending(&self) -> Vec<OrphanRecord> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Retry every recorded delete; failures stay in the ledger.
    pub async fn sweep(&self, blobs: &BlobAdapter) -> SweepReport {
        self.sweep_unreferenced(blobs, &HashSet::new()).await
    }

    /// Like [`OrphanLedger::sweep`], but entries in `in_use` are released
    /// from the ledger without deleting them.
    ///
    /// A mutation cancelled while its record write was in flight may have
    /// committed after all, so its upload is live.
    #[tracing::instrument(skip_all)]
    pub async fn sweep_unreferenced(&self, blobs: &BlobAdapter, in_use: &HashSet<AssetRef>) -> SweepReport {
        let batch = std::mem::take(&mut *self.entries.lock());
        let mut reclaimed = Vec::new();
        let mut failed = Vec::new();

        for mut entry in batch {
            if in_use.contains(&entry.reference) {
                tracing::debug!(reference = %entry.reference, "Orphan is referenced by a post, released");
                continue;
            }
            match blobs.delete(&entry.reference).await {
                Ok(()) => reclaimed.push(entry.reference),
                Err(err) => {
                    tracing::warn!(reference = %entry.reference, error = %err, "Orphan still not deletable");
                    entry.reason = err.to_string();
                    failed.push(entry);
                }
            }
        }

        let remaining = {
            let mut entries = self.entries.lock();
            entries.extend(failed);
            entries.len()
        };

        tracing::info!(reclaimed = reclaimed.len(), remaining, "Swept orphaned assets");
        SweepReport { reclaimed, remaining }
    }
}
