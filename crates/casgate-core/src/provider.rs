//! The gateway service object.
//!
//! [`CasGateway`] owns the collaborator stores, the resource lock table, the
//! access-key store and the configuration. Individual S3 operations are
//! implemented in the [`crate::ops`] submodules as `impl CasGateway` blocks.

use std::sync::Arc;

use crate::access_key::AccessKeyStore;
use crate::config::GatewayConfig;
use crate::lock::ResourceLock;
use crate::ops::blobref::ReclaimGate;
use crate::store::{BlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore};

/// The S3 gateway over a content-addressed blob store.
///
/// Constructed once by the server and shared via `Arc`; all fields are cheap
/// to clone.
///
/// # Examples
///
/// ```
/// use casgate_core::CasGateway;
/// use casgate_core::config::GatewayConfig;
///
/// let gateway = CasGateway::in_memory(GatewayConfig::default());
/// assert_eq!(gateway.config().default_region, "us-east-1");
/// ```
#[derive(Debug, Clone)]
pub struct CasGateway {
    /// Object and part content.
    pub(crate) blobs: Arc<dyn BlobStore>,
    /// Bucket, object, upload, access-key and reference-count records.
    pub(crate) meta: Arc<dyn MetadataStore>,
    /// Per-resource read/write locks.
    pub(crate) locks: ResourceLock,
    /// Gateway configuration.
    pub(crate) config: Arc<GatewayConfig>,
    /// Credential records.
    pub(crate) keys: AccessKeyStore,
    /// Orders blob removal against stores in flight.
    pub(crate) reclaim: ReclaimGate,
}

impl CasGateway {
    /// Create a gateway over the given stores.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
    ) -> Self {
        let locks = ResourceLock::new();
        let keys = AccessKeyStore::new(Arc::clone(&meta), locks.clone(), config.lock_timeout());
        Self {
            blobs,
            meta,
            locks,
            config: Arc::new(config),
            keys,
            reclaim: ReclaimGate::default(),
        }
    }

    /// Create a gateway over fresh in-memory stores.
    #[must_use]
    pub fn in_memory(config: GatewayConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryMetadataStore::new()),
        )
    }

    /// Returns a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the access-key store.
    #[must_use]
    pub fn access_keys(&self) -> &AccessKeyStore {
        &self.keys
    }

    /// Returns the resource lock table.
    #[must_use]
    pub fn locks(&self) -> &ResourceLock {
        &self.locks
    }
}
