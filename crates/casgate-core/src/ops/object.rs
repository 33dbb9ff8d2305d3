//! Object operation handlers.
//!
//! Implements `put_object`, `get_object`, `head_object`, `copy_object`, and
//! `delete_object`.
//!
//! Writers hold the bucket read lock and the object write lock. A new blob is
//! referenced before its record is written, and the blob a record replaced
//! is released only after the write, so a record never points at reclaimed
//! content.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::acl::{Action, Principal, authorize};
use crate::error::{ServiceError, ServiceResult};
use crate::lock::{LockGuard, LockNamespace};
use crate::provider::CasGateway;
use crate::state::{MetadataDirective, ObjectMeta, ObjectRecord, object_key, object_lock_path};
use crate::store::{ByteStream, Payload, get_json, put_json};
use crate::validation::{validate_metadata, validate_object_key};

/// An object record with its content.
pub struct GetObjectOutput {
    /// The object record.
    pub record: ObjectRecord,
    /// The content. Holds the bucket and object read locks until dropped,
    /// exhausted, or left unread past the idle timeout.
    pub body: ByteStream,
}

impl std::fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl CasGateway {
    /// Store an object, replacing any previous one under the same key.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `EntityTooLarge`, `InvalidArgument`,
    /// `InvalidDigest`, `BadDigest`, `IncompleteBody`, `SignatureDoesNotMatch`
    /// for a corrupted signed body.
    pub async fn put_object(
        &self,
        principal: &Principal,
        bucket: &str,
        name: &str,
        payload: Payload,
        meta: ObjectMeta,
    ) -> ServiceResult<ObjectRecord> {
        let timeout = self.lock_timeout();
        let _bucket_guard = self.locks.rlock(LockNamespace::Bucket, bucket, timeout).await?;
        let bucket_record = self.load_bucket(bucket).await?;
        authorize(principal, &bucket_record.owner, bucket_record.acl, Action::PutObject)?;
        self.check_declared_size(payload.size)?;
        validate_object_key(name)?;
        validate_metadata(&meta.user_metadata)?;

        let _object_guard = self
            .locks
            .lock(LockNamespace::Object, &object_lock_path(bucket, name), timeout)
            .await?;
        let prior = self.load_object(bucket, name).await?;

        let stored = self.store_content(payload).await?;
        let record = ObjectRecord::new(bucket, name, stored.cid, stored.etag, stored.size, meta);
        self.commit_object(&record).await?;
        if let Some(prior) = prior {
            self.release_blob_logged(&prior.cid).await;
        }

        info!(bucket = %bucket, key = %name, size = record.size, etag = %record.etag, "put object");
        Ok(record)
    }

    /// Fetch an object and stream its content.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchKey`.
    pub async fn get_object(
        &self,
        principal: &Principal,
        bucket: &str,
        name: &str,
    ) -> ServiceResult<GetObjectOutput> {
        let (record, guards) = self.read_object(principal, bucket, name).await?;
        let content = self.blobs.cat(&record.cid).await?;
        let body = guard_stream(content, guards, self.config.stream_idle_timeout());

        debug!(bucket = %bucket, key = %name, size = record.size, "get object");
        Ok(GetObjectOutput { record, body })
    }

    /// Fetch an object record without its content.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchKey`.
    pub async fn head_object(
        &self,
        principal: &Principal,
        bucket: &str,
        name: &str,
    ) -> ServiceResult<ObjectRecord> {
        let (record, _guards) = self.read_object(principal, bucket, name).await?;
        Ok(record)
    }

    /// Copy an object by reference: the destination shares the source's cid.
    ///
    /// With [`MetadataDirective::Copy`] the source's content headers and user
    /// metadata carry over and only the ACL comes from `meta`; with
    /// [`MetadataDirective::Replace`] everything comes from `meta`.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchKey` for the source,
    /// `InvalidArgument`.
    #[allow(clippy::too_many_arguments)]
    pub async fn copy_object(
        &self,
        principal: &Principal,
        src_bucket: &str,
        src_name: &str,
        dst_bucket: &str,
        dst_name: &str,
        directive: MetadataDirective,
        meta: ObjectMeta,
    ) -> ServiceResult<ObjectRecord> {
        validate_object_key(dst_name)?;
        validate_metadata(&meta.user_metadata)?;
        if src_bucket == dst_bucket
            && src_name == dst_name
            && directive == MetadataDirective::Copy
        {
            return Err(ServiceError::InvalidArgument {
                message: "This copy request is illegal because it is trying to copy an object to \
                          itself without changing the object's metadata"
                    .to_owned(),
            });
        }

        let timeout = self.lock_timeout();
        let _bucket_guards = self
            .locks
            .rlock_many(LockNamespace::Bucket, &[src_bucket, dst_bucket], timeout)
            .await?;
        let src_bucket_record = self.load_bucket(src_bucket).await?;
        let dst_bucket_record = self.load_bucket(dst_bucket).await?;
        authorize(principal, &dst_bucket_record.owner, dst_bucket_record.acl, Action::PutObject)?;

        let src_path = object_lock_path(src_bucket, src_name);
        let dst_path = object_lock_path(dst_bucket, dst_name);
        let _object_guards = self.lock_copy_pair(&src_path, &dst_path, timeout).await?;

        let source = self.load_object(src_bucket, src_name).await?;
        if !can_read(principal, &src_bucket_record, source.as_ref()) {
            return Err(ServiceError::AccessDenied);
        }
        let source = source.ok_or_else(|| ServiceError::NoSuchKey {
            key: src_name.to_owned(),
        })?;
        let prior = self.load_object(dst_bucket, dst_name).await?;

        let meta = match directive {
            MetadataDirective::Copy => ObjectMeta {
                acl: meta.acl,
                ..source.meta()
            },
            MetadataDirective::Replace => meta,
        };
        let record = ObjectRecord::new(
            dst_bucket,
            dst_name,
            source.cid.clone(),
            source.etag.clone(),
            source.size,
            meta,
        );

        self.retain_blob(&record.cid).await?;
        self.commit_object(&record).await?;
        if let Some(prior) = prior {
            self.release_blob_logged(&prior.cid).await;
        }

        info!(
            src_bucket = %src_bucket,
            src_key = %src_name,
            bucket = %dst_bucket,
            key = %dst_name,
            "copied object"
        );
        Ok(record)
    }

    /// Delete an object and release its content.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `NoSuchKey`.
    pub async fn delete_object(
        &self,
        principal: &Principal,
        bucket: &str,
        name: &str,
    ) -> ServiceResult<()> {
        let timeout = self.lock_timeout();
        let _bucket_guard = self.locks.rlock(LockNamespace::Bucket, bucket, timeout).await?;
        let bucket_record = self.load_bucket(bucket).await?;
        authorize(principal, &bucket_record.owner, bucket_record.acl, Action::DeleteObject)?;

        let _object_guard = self
            .locks
            .lock(LockNamespace::Object, &object_lock_path(bucket, name), timeout)
            .await?;
        let record = self
            .load_object(bucket, name)
            .await?
            .ok_or_else(|| ServiceError::NoSuchKey {
                key: name.to_owned(),
            })?;

        self.meta.delete(&object_key(bucket, name)).await?;
        self.release_blob_logged(&record.cid).await;

        info!(bucket = %bucket, key = %name, "deleted object");
        Ok(())
    }

    /// Read an object record. The caller holds the object lock.
    pub(crate) async fn load_object(
        &self,
        bucket: &str,
        name: &str,
    ) -> ServiceResult<Option<ObjectRecord>> {
        Ok(get_json(&*self.meta, &object_key(bucket, name)).await?)
    }

    /// Write an object record that already holds a reference on its cid,
    /// giving the reference back if the write fails.
    pub(crate) async fn commit_object(&self, record: &ObjectRecord) -> ServiceResult<()> {
        let key = object_key(&record.bucket, &record.name);
        if let Err(err) = put_json(&*self.meta, &key, record).await {
            self.release_blob_logged(&record.cid).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn read_object(
        &self,
        principal: &Principal,
        bucket: &str,
        name: &str,
    ) -> ServiceResult<(ObjectRecord, Vec<LockGuard>)> {
        let timeout = self.lock_timeout();
        let bucket_guard = self.locks.rlock(LockNamespace::Bucket, bucket, timeout).await?;
        let bucket_record = self.load_bucket(bucket).await?;
        let object_guard = self
            .locks
            .rlock(LockNamespace::Object, &object_lock_path(bucket, name), timeout)
            .await?;

        let record = self.load_object(bucket, name).await?;
        if !can_read(principal, &bucket_record, record.as_ref()) {
            return Err(ServiceError::AccessDenied);
        }
        let record = record.ok_or_else(|| ServiceError::NoSuchKey {
            key: name.to_owned(),
        })?;
        Ok((record, vec![object_guard, bucket_guard]))
    }

    /// Lock the source for reading and the destination for writing, in
    /// lexicographic order. A self-copy takes a single write lock.
    async fn lock_copy_pair(
        &self,
        src_path: &str,
        dst_path: &str,
        timeout: Duration,
    ) -> ServiceResult<Vec<LockGuard>> {
        if src_path == dst_path {
            let guard = self.locks.lock(LockNamespace::Object, dst_path, timeout).await?;
            return Ok(vec![guard]);
        }
        let mut guards = Vec::with_capacity(2);
        if src_path < dst_path {
            guards.push(self.locks.rlock(LockNamespace::Object, src_path, timeout).await?);
            guards.push(self.locks.lock(LockNamespace::Object, dst_path, timeout).await?);
        } else {
            guards.push(self.locks.lock(LockNamespace::Object, dst_path, timeout).await?);
            guards.push(self.locks.rlock(LockNamespace::Object, src_path, timeout).await?);
        }
        Ok(guards)
    }
}

/// Read access: the bucket ACL allows it, or the object itself is public.
fn can_read(
    principal: &Principal,
    bucket: &crate::state::BucketRecord,
    object: Option<&ObjectRecord>,
) -> bool {
    authorize(principal, &bucket.owner, bucket.acl, Action::GetObject).is_ok()
        || object.is_some_and(|o| o.acl.is_public_read())
}

/// Tie `guards` to the lifetime of `inner`, releasing them early when the
/// consumer stops pulling for `idle`.
fn guard_stream(inner: ByteStream, guards: Vec<LockGuard>, idle: Duration) -> ByteStream {
    let (activity, mut watcher) = watch::channel(());
    let expired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&expired);

    tokio::spawn(async move {
        let _guards = guards;
        loop {
            match tokio::time::timeout(idle, watcher.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => break,
                Err(_) => {
                    flag.store(true, Ordering::Release);
                    debug!("object stream idle, released locks");
                    break;
                }
            }
        }
    });

    Box::pin(GuardedStream {
        inner,
        activity: Some(activity),
        expired,
    })
}

pin_project! {
    struct GuardedStream {
        #[pin]
        inner: ByteStream,
        activity: Option<watch::Sender<()>>,
        expired: Arc<AtomicBool>,
    }
}

impl Stream for GuardedStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if this.activity.is_none() {
            return Poll::Ready(None);
        }

        if this.expired.load(Ordering::Acquire) {
            *this.activity = None;
            return Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "object stream was idle past its timeout",
            ))));
        }
        if let Some(activity) = this.activity.as_ref() {
            let _ = activity.send(());
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(None) => {
                *this.activity = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                *this.activity = None;
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}
