//! Gateway operations.
//!
//! Each submodule adds an `impl CasGateway` block for one resource family.
//! The helpers here are shared by all of them: bucket lookup, and the
//! content pipeline that streams a request body through the MD5 adapter into
//! the blob store and takes a reference on the resulting cid.

pub mod blobref;
pub mod bucket;
pub mod list;
pub mod multipart;
pub mod object;

use std::time::Duration;

use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::etag::{EtagStream, parse_content_md5};
use crate::provider::CasGateway;
use crate::state::{BucketRecord, bucket_key};
use crate::store::{Payload, StoreError, get_json};

/// Content committed to the blob store and referenced once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredContent {
    pub(crate) cid: String,
    pub(crate) etag: String,
    pub(crate) size: u64,
}

impl CasGateway {
    /// Lock acquisition budget of one request.
    pub(crate) fn lock_timeout(&self) -> Duration {
        self.config.lock_timeout()
    }

    /// Read a bucket record. The caller holds the bucket lock.
    pub(crate) async fn load_bucket(&self, bucket: &str) -> ServiceResult<BucketRecord> {
        get_json(&*self.meta, &bucket_key(bucket))
            .await?
            .ok_or_else(|| ServiceError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
    }

    /// Stream `payload` into the blob store and reference the result.
    ///
    /// On success the returned cid carries one reference owned by the caller,
    /// who must either commit it to a record or release it.
    pub(crate) async fn store_content(&self, payload: Payload) -> ServiceResult<StoredContent> {
        let storing = self.reclaim.enter().await;
        let stored = self.store_referenced(payload).await;
        drop(storing);
        self.drain_reclaims().await;
        stored
    }

    async fn store_referenced(&self, payload: Payload) -> ServiceResult<StoredContent> {
        let declared_md5 = payload
            .content_md5
            .as_deref()
            .map(parse_content_md5)
            .transpose()?;
        let (stream, handle) = EtagStream::new(payload.stream, declared_md5);

        let cid = match self.blobs.store(Box::pin(stream)).await {
            Ok(cid) => cid,
            Err(StoreError::Io(err)) => return Err(ServiceError::from_body_error(err)),
            Err(err) => return Err(err.into()),
        };
        let fingerprint = handle.fingerprint().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "blob store returned {cid} before consuming the body"
            ))
        })?;
        self.retain_blob(&cid).await?;

        if let Some(expected) = payload.size {
            if expected != fingerprint.size {
                self.release_blob_logged(&cid).await;
                return Err(ServiceError::IncompleteBody {
                    expected,
                    actual: fingerprint.size,
                });
            }
        }
        let max = self.config.max_object_size;
        if fingerprint.size > max {
            self.release_blob_logged(&cid).await;
            return Err(ServiceError::EntityTooLarge {
                size: fingerprint.size,
                max,
            });
        }

        debug!(cid = %cid, size = fingerprint.size, "stored content");
        Ok(StoredContent {
            cid,
            etag: fingerprint.etag(),
            size: fingerprint.size,
        })
    }

    /// Reject a declared size above the object limit before reading the body.
    pub(crate) fn check_declared_size(&self, size: Option<u64>) -> ServiceResult<()> {
        let max = self.config.max_object_size;
        match size {
            Some(size) if size > max => Err(ServiceError::EntityTooLarge { size, max }),
            _ => Ok(()),
        }
    }
}
