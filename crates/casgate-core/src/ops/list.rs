//! List operation handlers.
//!
//! Implements `list_objects` (v1, marker based) and `empty_bucket`.

use std::ops::ControlFlow;

use tracing::debug;

use crate::acl::{Action, Principal, authorize};
use crate::error::{ServiceError, ServiceResult};
use crate::lock::LockNamespace;
use crate::provider::CasGateway;
use crate::state::{ObjectRecord, object_prefix};
use crate::store::StoreError;

/// Default and maximum number of entries returned in a single listing.
pub const MAX_KEYS: usize = 1000;

/// Parameters of a `ListObjects` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsQuery {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Roll keys up to the first occurrence of this after the prefix.
    pub delimiter: Option<String>,
    /// Resume after this key or common prefix.
    pub marker: Option<String>,
    /// Entry limit, capped at [`MAX_KEYS`].
    pub max_keys: Option<usize>,
}

/// Result of a `ListObjects` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsOutput {
    /// Matching objects in key order.
    pub objects: Vec<ObjectRecord>,
    /// Rolled-up common prefixes in key order.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Last emitted key or common prefix, set when truncated.
    pub next_marker: Option<String>,
}

/// Accumulates listing entries while the metadata store is iterated.
struct Listing<'a> {
    query: &'a ListObjectsQuery,
    max: usize,
    out: ListObjectsOutput,
    last: Option<String>,
    failure: Option<StoreError>,
}

impl Listing<'_> {
    fn entries(&self) -> usize {
        self.out.objects.len() + self.out.common_prefixes.len()
    }

    fn skipped_by_marker(&self, name: &str) -> bool {
        let Some(marker) = self.query.marker.as_deref() else {
            return false;
        };
        if name <= marker {
            return true;
        }
        // Keys under a common prefix returned by the previous page.
        self.query
            .delimiter
            .as_deref()
            .is_some_and(|d| !d.is_empty() && marker.ends_with(d) && name.starts_with(marker))
    }

    fn common_prefix<'n>(&self, name: &'n str) -> Option<&'n str> {
        let delimiter = self.query.delimiter.as_deref().filter(|d| !d.is_empty())?;
        let rest = &name[self.query.prefix.len()..];
        rest.find(delimiter)
            .map(|pos| &name[..self.query.prefix.len() + pos + delimiter.len()])
    }

    fn visit(&mut self, key: &str, name: &str, raw: &[u8]) -> ControlFlow<()> {
        if self.skipped_by_marker(name) {
            return ControlFlow::Continue(());
        }

        if let Some(prefix) = self.common_prefix(name) {
            if self.out.common_prefixes.last().is_some_and(|p| p == prefix) {
                return ControlFlow::Continue(());
            }
            if self.entries() == self.max {
                self.out.is_truncated = true;
                return ControlFlow::Break(());
            }
            self.out.common_prefixes.push(prefix.to_owned());
            self.last = Some(prefix.to_owned());
            return ControlFlow::Continue(());
        }

        if self.entries() == self.max {
            self.out.is_truncated = true;
            return ControlFlow::Break(());
        }
        match serde_json::from_slice::<ObjectRecord>(raw) {
            Ok(record) => {
                self.out.objects.push(record);
                self.last = Some(name.to_owned());
                ControlFlow::Continue(())
            }
            Err(source) => {
                self.failure = Some(StoreError::Codec {
                    key: key.to_owned(),
                    source,
                });
                ControlFlow::Break(())
            }
        }
    }
}

impl CasGateway {
    /// List the objects of a bucket.
    ///
    /// Keys that contain the delimiter after the prefix collapse into one
    /// common prefix each. The listing resumes strictly after `marker` and
    /// skips keys under it when it is itself a common prefix.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, `AccessDenied`.
    pub async fn list_objects(
        &self,
        principal: &Principal,
        bucket: &str,
        query: &ListObjectsQuery,
    ) -> ServiceResult<ListObjectsOutput> {
        let _guard = self
            .locks
            .rlock(LockNamespace::Bucket, bucket, self.lock_timeout())
            .await?;
        let record = self.load_bucket(bucket).await?;
        authorize(principal, &record.owner, record.acl, Action::ListObjects)?;

        let max = query.max_keys.unwrap_or(MAX_KEYS).min(MAX_KEYS);
        if max == 0 {
            return Ok(ListObjectsOutput::default());
        }

        let base = object_prefix(bucket);
        let scan_prefix = format!("{base}{}", query.prefix);
        let mut listing = Listing {
            query,
            max,
            out: ListObjectsOutput::default(),
            last: None,
            failure: None,
        };
        self.meta
            .iterate(&scan_prefix, &mut |key: &str, raw: &[u8]| {
                listing.visit(key, &key[base.len()..], raw)
            })
            .await?;

        if let Some(err) = listing.failure {
            return Err(ServiceError::Store(err));
        }
        let mut out = listing.out;
        if out.is_truncated {
            out.next_marker = listing.last;
        }

        debug!(
            bucket = %bucket,
            prefix = %query.prefix,
            objects = out.objects.len(),
            common_prefixes = out.common_prefixes.len(),
            truncated = out.is_truncated,
            "list_objects completed"
        );
        Ok(out)
    }

    /// Whether a bucket holds no objects. Stops at the first object found.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn empty_bucket(&self, bucket: &str) -> ServiceResult<bool> {
        let mut empty = true;
        self.meta
            .iterate(&object_prefix(bucket), &mut |_: &str, _: &[u8]| {
                empty = false;
                ControlFlow::Break(())
            })
            .await?;
        Ok(empty)
    }
}
