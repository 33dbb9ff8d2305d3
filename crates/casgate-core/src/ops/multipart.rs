//! Multipart upload handlers.
//!
//! Implements `create_multipart_upload`, `upload_part`, `list_parts`,
//! `list_multipart_uploads`, `abort_multipart_upload`, and
//! `complete_multipart_upload`.
//!
//! Part content is stored without holding the upload lock so parts of one
//! upload can stream in parallel; the lock is only taken to splice the new
//! part into the record.

use std::io;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::acl::{Action, Principal, authorize};
use crate::error::{ServiceError, ServiceResult};
use crate::etag::{canonicalize, multipart_etag};
use crate::lock::{LockGuard, LockNamespace};
use crate::ops::StoredContent;
use crate::provider::CasGateway;
use crate::state::{
    CompletedPart, MultipartRecord, ObjectMeta, ObjectRecord, PartRecord, UPLOAD_PREFIX,
    object_lock_path, upload_key,
};
use crate::store::{ByteStream, Payload, get_json, put_json, scan_json};
use crate::utils::generate_upload_id;
use crate::validation::{validate_metadata, validate_object_key, validate_part_number};

impl CasGateway {
    /// Start a multipart upload. `meta` is applied to the object on
    /// completion.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `InvalidArgument`.
    pub async fn create_multipart_upload(
        &self,
        principal: &Principal,
        bucket: &str,
        object: &str,
        meta: ObjectMeta,
    ) -> ServiceResult<MultipartRecord> {
        validate_object_key(object)?;
        validate_metadata(&meta.user_metadata)?;
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::CreateMultipartUpload)
            .await?;

        let upload = MultipartRecord::new(
            bucket,
            object,
            generate_upload_id(),
            principal.to_string(),
            meta,
        );
        put_json(&*self.meta, &upload_key(&upload.upload_id), &upload).await?;

        info!(
            bucket = %bucket,
            key = %object,
            upload_id = %upload.upload_id,
            "created multipart upload"
        );
        Ok(upload)
    }

    /// Store one part, replacing any earlier part with the same number.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for part numbers outside 1..=10000, `NoSuchBucket`,
    /// `AccessDenied`, `NoSuchUpload`, and the body errors of `put_object`.
    pub async fn upload_part(
        &self,
        principal: &Principal,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        payload: Payload,
    ) -> ServiceResult<PartRecord> {
        validate_part_number(part_number)?;
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::UploadPart)
            .await?;
        self.check_declared_size(payload.size)?;
        self.load_upload(bucket, object, upload_id).await?;

        let StoredContent { cid, etag, size } = self.store_content(payload).await?;
        let part = PartRecord::new(part_number, etag, cid, size);

        let _upload_guard = self
            .locks
            .lock(LockNamespace::Upload, upload_id, self.lock_timeout())
            .await?;
        let mut upload = match self.load_upload(bucket, object, upload_id).await {
            Ok(upload) => upload,
            Err(err) => {
                self.release_blob_logged(&part.cid).await;
                return Err(err);
            }
        };
        let replaced = upload.put_part(part.clone());
        if let Err(err) = put_json(&*self.meta, &upload_key(upload_id), &upload).await {
            self.release_blob_logged(&part.cid).await;
            return Err(err.into());
        }
        if let Some(replaced) = replaced {
            self.release_blob_logged(&replaced.cid).await;
        }

        debug!(
            bucket = %bucket,
            key = %object,
            upload_id = %upload_id,
            part_number,
            size = part.size,
            "uploaded part"
        );
        Ok(part)
    }

    /// An upload with its parts in part-number order.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchUpload`.
    pub async fn list_parts(
        &self,
        principal: &Principal,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> ServiceResult<MultipartRecord> {
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::ListParts)
            .await?;
        let _upload_guard = self
            .locks
            .rlock(LockNamespace::Upload, upload_id, self.lock_timeout())
            .await?;
        self.load_upload(bucket, object, upload_id).await
    }

    /// In-progress uploads of a bucket, ordered by object key then initiation
    /// time.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn list_multipart_uploads(
        &self,
        principal: &Principal,
        bucket: &str,
    ) -> ServiceResult<Vec<MultipartRecord>> {
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::ListMultipartUploads)
            .await?;
        let mut uploads: Vec<MultipartRecord> =
            scan_json::<MultipartRecord>(&*self.meta, UPLOAD_PREFIX, None)
                .await?
                .into_iter()
                .map(|(_, upload)| upload)
                .filter(|upload| upload.bucket == bucket)
                .collect();
        uploads.sort_by(|a, b| {
            a.object
                .cmp(&b.object)
                .then(a.initiated.cmp(&b.initiated))
                .then_with(|| a.upload_id.cmp(&b.upload_id))
        });
        Ok(uploads)
    }

    /// Discard an upload and release every part.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchUpload`.
    pub async fn abort_multipart_upload(
        &self,
        principal: &Principal,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> ServiceResult<()> {
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::AbortMultipartUpload)
            .await?;
        let _upload_guard = self
            .locks
            .lock(LockNamespace::Upload, upload_id, self.lock_timeout())
            .await?;
        let upload = self.load_upload(bucket, object, upload_id).await?;

        self.meta.delete(&upload_key(upload_id)).await?;
        for part in upload.parts() {
            self.release_blob_logged(&part.cid).await;
        }

        info!(bucket = %bucket, key = %object, upload_id = %upload_id, "aborted multipart upload");
        Ok(())
    }

    /// Assemble the requested parts into the object.
    ///
    /// Every check runs before anything changes: the part list must be
    /// non-empty and strictly ascending, each part must exist with the
    /// given ETag, and every part but the last must reach the minimum part
    /// size.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchUpload`, `MalformedXml`,
    /// `InvalidPartOrder`, `InvalidPart`, `PartTooSmall`, `EntityTooLarge`.
    pub async fn complete_multipart_upload(
        &self,
        principal: &Principal,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ServiceResult<ObjectRecord> {
        let timeout = self.lock_timeout();
        let _bucket_guard = self
            .authorize_upload(principal, bucket, Action::CompleteMultipartUpload)
            .await?;
        let _object_guard = self
            .locks
            .lock(LockNamespace::Object, &object_lock_path(bucket, object), timeout)
            .await?;
        let _upload_guard = self
            .locks
            .lock(LockNamespace::Upload, upload_id, timeout)
            .await?;
        let upload = self.load_upload(bucket, object, upload_id).await?;

        let selected = select_parts(&upload, parts, self.config.min_part_size)?;
        let total: u64 = selected.iter().map(|p| p.size).sum();
        let max = self.config.max_object_size;
        if total > max {
            return Err(ServiceError::EntityTooLarge { size: total, max });
        }

        let prior = self.load_object(bucket, object).await?;
        let cids: Vec<String> = selected.iter().map(|p| p.cid.clone()).collect();
        let blobs = Arc::clone(&self.blobs);
        let joined: ByteStream = Box::pin(
            stream::iter(cids)
                .then(move |cid| {
                    let blobs = Arc::clone(&blobs);
                    async move { blobs.cat(&cid).await.map_err(io::Error::other) }
                })
                .try_flatten(),
        );
        let stored = self
            .store_content(Payload::new(joined).with_size(total))
            .await?;

        let etag = multipart_etag(parts.iter().map(|p| p.etag.as_str()));
        let record = ObjectRecord::new(
            bucket,
            object,
            stored.cid,
            etag,
            stored.size,
            upload.metadata.clone(),
        );
        self.commit_object(&record).await?;
        if let Some(prior) = prior {
            self.release_blob_logged(&prior.cid).await;
        }

        // The object is already visible. A stale upload record keeps its part
        // references so a later abort releases them exactly once.
        match self.meta.delete(&upload_key(upload_id)).await {
            Ok(()) => {
                for part in upload.parts() {
                    self.release_blob_logged(&part.cid).await;
                }
            }
            Err(err) => {
                warn!(
                    upload_id = %upload_id,
                    error = %err,
                    "failed to drop completed upload record"
                );
            }
        }

        info!(
            bucket = %bucket,
            key = %object,
            upload_id = %upload_id,
            parts = parts.len(),
            size = record.size,
            etag = %record.etag,
            "completed multipart upload"
        );
        Ok(record)
    }

    /// Shared-lock the bucket and check the caller's access for `action`.
    async fn authorize_upload(
        &self,
        principal: &Principal,
        bucket: &str,
        action: Action,
    ) -> ServiceResult<LockGuard> {
        let guard = self
            .locks
            .rlock(LockNamespace::Bucket, bucket, self.lock_timeout())
            .await?;
        let record = self.load_bucket(bucket).await?;
        authorize(principal, &record.owner, record.acl, action)?;
        Ok(guard)
    }

    /// Read an upload of `bucket/object`. A record for another target is
    /// treated as absent.
    async fn load_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> ServiceResult<MultipartRecord> {
        get_json::<MultipartRecord>(&*self.meta, &upload_key(upload_id))
            .await?
            .filter(|upload| upload.targets(bucket, object))
            .ok_or_else(|| ServiceError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }
}

/// Validate a completion request against the upload and pick its parts.
fn select_parts<'a>(
    upload: &'a MultipartRecord,
    requested: &[CompletedPart],
    min_part_size: u64,
) -> ServiceResult<Vec<&'a PartRecord>> {
    if requested.is_empty() {
        return Err(ServiceError::MalformedXml {
            message: "You must specify at least one part".to_owned(),
        });
    }

    let mut previous = 0;
    let mut selected = Vec::with_capacity(requested.len());
    for wanted in requested {
        if wanted.part_number <= previous {
            return Err(ServiceError::InvalidPartOrder {
                part_number: wanted.part_number,
            });
        }
        previous = wanted.part_number;

        let expected = canonicalize(&wanted.etag);
        match upload.parts.get(&wanted.part_number) {
            Some(part) if part.etag == expected => selected.push(part),
            found => {
                return Err(ServiceError::InvalidPart {
                    part_number: wanted.part_number,
                    expected: expected.to_owned(),
                    actual: found.map(|p| p.etag.clone()).unwrap_or_default(),
                });
            }
        }
    }

    let last = selected.len() - 1;
    if let Some(small) = selected[..last].iter().find(|p| p.size < min_part_size) {
        return Err(ServiceError::PartTooSmall {
            part_number: small.number,
            size: small.size,
            min: min_part_size,
        });
    }
    Ok(selected)
}
