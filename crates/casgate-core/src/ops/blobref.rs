//! Blob reference counting.
//!
//! Every object or part record holds one reference on its cid. Content is
//! removed from the blob store when the last reference goes away. Because
//! content addressing makes identical bytes share a cid, the count covers
//! records that stored the same bytes independently as well as copies.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::lock::LockNamespace;
use crate::provider::CasGateway;
use crate::state::{BlobRefRecord, blobref_key};
use crate::store::{get_json, put_json};

/// Orders content removal against stores in flight.
///
/// A store holds a shared guard from the moment it writes content until the
/// new reference is recorded. Content is only removed under the exclusive
/// guard, so a store that deduplicates onto an existing cid never sees that
/// cid disappear before it can reference it. Removals that find a store in
/// flight are queued and retried once the gate is free.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReclaimGate {
    gate: Arc<RwLock<()>>,
    deferred: Arc<Mutex<Vec<String>>>,
}

impl ReclaimGate {
    /// Hold off removals until the returned guard drops.
    pub(crate) async fn enter(&self) -> OwnedRwLockReadGuard<()> {
        Arc::clone(&self.gate).read_owned().await
    }

    fn try_exclusive(&self) -> Option<OwnedRwLockWriteGuard<()>> {
        Arc::clone(&self.gate).try_write_owned().ok()
    }

    fn defer(&self, cid: &str) {
        self.deferred.lock().push(cid.to_owned());
    }

    fn take_deferred(&self) -> Vec<String> {
        std::mem::take(&mut *self.deferred.lock())
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.deferred.lock().len()
    }
}

impl CasGateway {
    /// Number of records referencing `cid`.
    ///
    /// # Errors
    ///
    /// Returns a store or lock error.
    pub async fn blob_refs(&self, cid: &str) -> ServiceResult<u64> {
        let _guard = self
            .locks
            .rlock(LockNamespace::BlobRef, cid, self.lock_timeout())
            .await?;
        let record: Option<BlobRefRecord> = get_json(&*self.meta, &blobref_key(cid)).await?;
        Ok(record.map_or(0, |r| r.refs))
    }

    /// Take one reference on `cid`, returning the new count.
    pub(crate) async fn retain_blob(&self, cid: &str) -> ServiceResult<u64> {
        let _guard = self
            .locks
            .lock(LockNamespace::BlobRef, cid, self.lock_timeout())
            .await?;
        let key = blobref_key(cid);
        let mut record: BlobRefRecord = get_json(&*self.meta, &key).await?.unwrap_or_default();

        // An unreferenced cid may have been reclaimed after the caller stored it.
        if record.refs == 0 && !self.blobs.exists(cid).await? {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "blob {cid} was reclaimed before it could be referenced"
            )));
        }

        record.refs += 1;
        put_json(&*self.meta, &key, &record).await?;
        debug!(cid = %cid, refs = record.refs, "retained blob");
        Ok(record.refs)
    }

    /// Drop one reference on `cid`, removing the content at zero.
    pub(crate) async fn release_blob(&self, cid: &str) -> ServiceResult<()> {
        self.drop_reference(cid).await?;
        self.drain_reclaims().await;
        Ok(())
    }

    async fn drop_reference(&self, cid: &str) -> ServiceResult<()> {
        let _guard = self
            .locks
            .lock(LockNamespace::BlobRef, cid, self.lock_timeout())
            .await?;
        let key = blobref_key(cid);
        let Some(mut record) = get_json::<BlobRefRecord>(&*self.meta, &key).await? else {
            warn!(cid = %cid, "released a blob without references");
            return Ok(());
        };

        if record.refs > 1 {
            record.refs -= 1;
            put_json(&*self.meta, &key, &record).await?;
            debug!(cid = %cid, refs = record.refs, "released blob");
            return Ok(());
        }

        // Drop the count first: a failed removal leaks content instead of
        // leaving a count on missing content.
        self.meta.delete(&key).await?;
        match self.reclaim.try_exclusive() {
            Some(_exclusive) => {
                self.blobs.remove(cid).await?;
                debug!(cid = %cid, "reclaimed blob");
            }
            None => {
                self.reclaim.defer(cid);
                debug!(cid = %cid, "deferred reclaim behind stores in flight");
            }
        }
        Ok(())
    }

    /// Remove queued content that is still unreferenced, if no store is in flight.
    pub(crate) async fn drain_reclaims(&self) {
        let Some(_exclusive) = self.reclaim.try_exclusive() else {
            return;
        };
        for cid in self.reclaim.take_deferred() {
            if let Err(err) = self.reclaim_unreferenced(&cid).await {
                warn!(cid = %cid, error = %err, "failed to reclaim deferred blob");
            }
        }
    }

    async fn reclaim_unreferenced(&self, cid: &str) -> ServiceResult<()> {
        let _guard = self
            .locks
            .lock(LockNamespace::BlobRef, cid, self.lock_timeout())
            .await?;
        let record: Option<BlobRefRecord> = get_json(&*self.meta, &blobref_key(cid)).await?;
        if record.is_some() {
            debug!(cid = %cid, "deferred blob was referenced again");
            return Ok(());
        }
        self.blobs.remove(cid).await?;
        debug!(cid = %cid, "reclaimed deferred blob");
        Ok(())
    }

    /// Release after the owning record change is already durable.
    ///
    /// A failure here leaks content but never leaves a record pointing at
    /// missing content, so it is logged rather than returned.
    pub(crate) async fn release_blob_logged(&self, cid: &str) {
        if let Err(err) = self.release_blob(cid).await {
            warn!(cid = %cid, error = %err, "failed to release blob");
        }
    }
}
