//! Access-key management.
//!
//! [`AccessKeyStore`] owns the `accesskey/<key>` records. Every mutation holds
//! the key's exclusive lock across its read-modify-write, and soft-deleted
//! records behave as absent for every operation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use casgate_auth::{AuthError, CredentialProvider, SecretLookup};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::lock::{LockNamespace, ResourceLock};
use crate::state::{ACCESS_KEY_PREFIX, AccessKeyRecord, access_key_key};
use crate::store::{MetadataStore, get_json, put_json, scan_json};
use crate::utils::{generate_access_key, generate_secret_key};

/// Attempts at drawing an unused access key before giving up.
const MAX_GENERATE_ATTEMPTS: usize = 8;

/// Credential records with their lifecycle operations.
///
/// Cloning is cheap; clones share the metadata store and lock table.
#[derive(Clone)]
pub struct AccessKeyStore {
    meta: Arc<dyn MetadataStore>,
    locks: ResourceLock,
    timeout: Duration,
}

impl fmt::Debug for AccessKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AccessKeyStore {
    /// Create a store over `meta`, sharing the gateway's lock table.
    pub fn new(meta: Arc<dyn MetadataStore>, locks: ResourceLock, timeout: Duration) -> Self {
        Self {
            meta,
            locks,
            timeout,
        }
    }

    /// Create a fresh enabled key pair.
    ///
    /// # Errors
    ///
    /// Returns a store or lock error.
    pub async fn generate(&self) -> ServiceResult<AccessKeyRecord> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let key = generate_access_key();
            let _guard = self
                .locks
                .lock(LockNamespace::AccessKey, &key, self.timeout)
                .await?;
            if self.load(&key).await?.is_some() {
                continue;
            }
            let record = AccessKeyRecord::new(key, generate_secret_key());
            self.save(&record).await?;
            info!(access_key = %record.key, "generated access key");
            return Ok(record);
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not draw an unused access key"
        )))
    }

    /// Seed a fixed key pair. Re-seeding an existing live key keeps it as is.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidArgument`] for an empty key or secret,
    /// or a store or lock error.
    pub async fn bootstrap(&self, key: &str, secret: &str) -> ServiceResult<AccessKeyRecord> {
        if key.is_empty() || secret.is_empty() {
            return Err(ServiceError::InvalidArgument {
                message: "bootstrap access key and secret must not be empty".to_owned(),
            });
        }
        let _guard = self
            .locks
            .lock(LockNamespace::AccessKey, key, self.timeout)
            .await?;
        if let Some(existing) = self.load(key).await?.filter(|r| !r.is_deleted) {
            debug!(access_key = %key, "bootstrap access key already present");
            return Ok(existing);
        }
        let record = AccessKeyRecord::new(key.to_owned(), secret.to_owned());
        self.save(&record).await?;
        info!(access_key = %key, "bootstrapped access key");
        Ok(record)
    }

    /// Allow `key` to sign requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSuchAccessKey`] for absent or deleted keys.
    pub async fn enable(&self, key: &str) -> ServiceResult<AccessKeyRecord> {
        self.update(key, |record| record.enable = true).await
    }

    /// Stop `key` from signing requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSuchAccessKey`] for absent or deleted keys.
    pub async fn disable(&self, key: &str) -> ServiceResult<AccessKeyRecord> {
        self.update(key, |record| record.enable = false).await
    }

    /// Replace the secret of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSuchAccessKey`] for absent or deleted keys.
    pub async fn reset(&self, key: &str) -> ServiceResult<AccessKeyRecord> {
        self.update(key, |record| record.secret = generate_secret_key())
            .await
    }

    /// Soft-delete `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSuchAccessKey`] for absent or already deleted
    /// keys.
    pub async fn delete(&self, key: &str) -> ServiceResult<()> {
        self.update(key, |record| record.is_deleted = true).await?;
        Ok(())
    }

    /// Fetch a live record.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSuchAccessKey`] for absent or deleted keys.
    pub async fn get(&self, key: &str) -> ServiceResult<AccessKeyRecord> {
        let _guard = self
            .locks
            .rlock(LockNamespace::AccessKey, key, self.timeout)
            .await?;
        self.load_live(key).await
    }

    /// All live records, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list(&self) -> ServiceResult<Vec<AccessKeyRecord>> {
        let records = scan_json::<AccessKeyRecord>(&*self.meta, ACCESS_KEY_PREFIX, None).await?;
        Ok(records
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| !record.is_deleted)
            .collect())
    }

    async fn update(
        &self,
        key: &str,
        mutate: impl FnOnce(&mut AccessKeyRecord) + Send,
    ) -> ServiceResult<AccessKeyRecord> {
        let _guard = self
            .locks
            .lock(LockNamespace::AccessKey, key, self.timeout)
            .await?;
        let mut record = self.load_live(key).await?;
        mutate(&mut record);
        record.touch();
        self.save(&record).await?;
        debug!(
            access_key = %key,
            enable = record.enable,
            is_deleted = record.is_deleted,
            "updated access key"
        );
        Ok(record)
    }

    async fn load(&self, key: &str) -> ServiceResult<Option<AccessKeyRecord>> {
        Ok(get_json(&*self.meta, &access_key_key(key)).await?)
    }

    async fn load_live(&self, key: &str) -> ServiceResult<AccessKeyRecord> {
        self.load(key)
            .await?
            .filter(|record| !record.is_deleted)
            .ok_or_else(|| ServiceError::NoSuchAccessKey {
                key: key.to_owned(),
            })
    }

    async fn save(&self, record: &AccessKeyRecord) -> ServiceResult<()> {
        put_json(&*self.meta, &access_key_key(&record.key), record).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for AccessKeyStore {
    async fn lookup(&self, access_key_id: &str) -> Result<SecretLookup, AuthError> {
        match self.get(access_key_id).await {
            Ok(record) => Ok(SecretLookup {
                secret: record.secret,
                exists: true,
                enabled: record.enable,
            }),
            Err(ServiceError::NoSuchAccessKey { .. }) => Ok(SecretLookup::missing()),
            Err(err) => Err(AuthError::Lookup(err.to_string())),
        }
    }
}
