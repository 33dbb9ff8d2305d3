//! Bucket operation handlers.
//!
//! Implements `create_bucket`, `get_bucket`, `get_bucket_acl`,
//! `put_bucket_acl`, `get_bucket_location`, `delete_bucket`, and
//! `list_buckets_of_user`.

use tracing::{debug, info};

use crate::acl::{Acl, Action, Principal, authorize, authorize_create_bucket};
use crate::error::{ServiceError, ServiceResult};
use crate::lock::LockNamespace;
use crate::provider::CasGateway;
use crate::state::{
    BUCKET_PREFIX, BucketRecord, MultipartRecord, UPLOAD_PREFIX, bucket_key, upload_key,
};
use crate::store::{get_json, put_json, scan_json};
use crate::validation::validate_bucket_name;

impl CasGateway {
    /// Create a bucket owned by the caller.
    ///
    /// `region` falls back to the configured default region.
    ///
    /// # Errors
    ///
    /// `InvalidBucketName`, `AccessDenied` for anonymous callers,
    /// `BucketAlreadyOwnedByYou` / `BucketAlreadyExists` for taken names.
    pub async fn create_bucket(
        &self,
        principal: &Principal,
        name: &str,
        region: Option<&str>,
        acl: Acl,
    ) -> ServiceResult<BucketRecord> {
        validate_bucket_name(name)?;
        authorize_create_bucket(principal)?;
        let owner = principal.access_key().unwrap_or_default();

        let _guard = self
            .locks
            .lock(LockNamespace::Bucket, name, self.lock_timeout())
            .await?;

        if let Some(existing) = get_json::<BucketRecord>(&*self.meta, &bucket_key(name)).await? {
            return Err(if existing.owner == owner {
                ServiceError::BucketAlreadyOwnedByYou {
                    bucket: name.to_owned(),
                }
            } else {
                ServiceError::BucketAlreadyExists {
                    bucket: name.to_owned(),
                }
            });
        }

        let region = region
            .filter(|r| !r.is_empty())
            .unwrap_or(self.config.default_region.as_str());
        let record = BucketRecord::new(name, region, owner, acl);
        put_json(&*self.meta, &bucket_key(name), &record).await?;

        info!(bucket = %name, owner = %owner, acl = %acl, "created bucket");
        Ok(record)
    }

    /// Fetch a bucket the caller may read (HEAD bucket).
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn get_bucket(
        &self,
        principal: &Principal,
        name: &str,
    ) -> ServiceResult<BucketRecord> {
        self.read_bucket(principal, name, Action::HeadBucket).await
    }

    /// The canned ACL of a bucket. Owner only.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn get_bucket_acl(
        &self,
        principal: &Principal,
        name: &str,
    ) -> ServiceResult<BucketRecord> {
        self.read_bucket(principal, name, Action::GetBucketAcl).await
    }

    /// The region a bucket lives in.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn get_bucket_location(
        &self,
        principal: &Principal,
        name: &str,
    ) -> ServiceResult<String> {
        Ok(self
            .read_bucket(principal, name, Action::GetBucketLocation)
            .await?
            .region)
    }

    /// Replace the canned ACL of a bucket. Owner only.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn put_bucket_acl(
        &self,
        principal: &Principal,
        name: &str,
        acl: Acl,
    ) -> ServiceResult<BucketRecord> {
        let _guard = self
            .locks
            .lock(LockNamespace::Bucket, name, self.lock_timeout())
            .await?;
        let mut record = self.load_bucket(name).await?;
        authorize(principal, &record.owner, record.acl, Action::PutBucketAcl)?;

        record.acl = acl;
        put_json(&*self.meta, &bucket_key(name), &record).await?;

        info!(bucket = %name, acl = %acl, "updated bucket acl");
        Ok(record)
    }

    /// Delete an empty bucket. Owner only.
    ///
    /// In-progress multipart uploads of the bucket are aborted with it.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`, `BucketNotEmpty`.
    pub async fn delete_bucket(&self, principal: &Principal, name: &str) -> ServiceResult<()> {
        let _guard = self
            .locks
            .lock(LockNamespace::Bucket, name, self.lock_timeout())
            .await?;
        let record = self.load_bucket(name).await?;
        authorize(principal, &record.owner, record.acl, Action::DeleteBucket)?;

        if !self.empty_bucket(name).await? {
            return Err(ServiceError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }

        self.abort_bucket_uploads(name).await?;
        self.meta.delete(&bucket_key(name)).await?;

        info!(bucket = %name, "deleted bucket");
        Ok(())
    }

    /// Buckets owned by the caller, ordered by name.
    ///
    /// # Errors
    ///
    /// `AccessDenied` for anonymous callers.
    pub async fn list_buckets_of_user(
        &self,
        principal: &Principal,
    ) -> ServiceResult<Vec<BucketRecord>> {
        let Some(owner) = principal.access_key() else {
            return Err(ServiceError::AccessDenied);
        };
        let buckets = scan_json::<BucketRecord>(&*self.meta, BUCKET_PREFIX, None).await?;
        let owned: Vec<BucketRecord> = buckets
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.owner == owner)
            .collect();

        debug!(owner = %owner, count = owned.len(), "listed buckets");
        Ok(owned)
    }

    async fn read_bucket(
        &self,
        principal: &Principal,
        name: &str,
        action: Action,
    ) -> ServiceResult<BucketRecord> {
        let _guard = self
            .locks
            .rlock(LockNamespace::Bucket, name, self.lock_timeout())
            .await?;
        let record = self.load_bucket(name).await?;
        authorize(principal, &record.owner, record.acl, action)?;
        Ok(record)
    }

    /// Abort every upload targeting `bucket`. The caller holds the bucket
    /// exclusively.
    async fn abort_bucket_uploads(&self, bucket: &str) -> ServiceResult<()> {
        let uploads = scan_json::<MultipartRecord>(&*self.meta, UPLOAD_PREFIX, None).await?;
        for (_, upload) in uploads.into_iter().filter(|(_, u)| u.bucket == bucket) {
            let _guard = self
                .locks
                .lock(LockNamespace::Upload, &upload.upload_id, self.lock_timeout())
                .await?;
            self.meta.delete(&upload_key(&upload.upload_id)).await?;
            for part in upload.parts() {
                self.release_blob_logged(&part.cid).await;
            }
            debug!(
                bucket = %bucket,
                upload_id = %upload.upload_id,
                "aborted upload of deleted bucket"
            );
        }
        Ok(())
    }
}
