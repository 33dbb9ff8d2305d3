//! Per-resource read/write locking.
//!
//! Every lockable resource is a `(namespace, path)` pair. The first locker of a
//! key creates its entry in the table; the entry is removed as soon as the last
//! holder or waiter goes away, so the table only ever contains keys that are in
//! use. Acquisition is bounded by a timeout and cancel-safe: dropping a pending
//! acquisition future gives its table reference back.
//!
//! Ordering convention for callers holding more than one lock: bucket before
//! object, and two resources of the same namespace in lexicographic order.
//! [`ResourceLock::lock_many`] and [`ResourceLock::rlock_many`] apply the latter
//! automatically.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

/// Lock acquisition failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The lock was not acquired before the deadline.
    #[error("operation timed out acquiring lock on {resource}")]
    OperationTimedOut {
        /// The `namespace/path` key that could not be locked.
        resource: String,
    },
}

/// Lock namespaces. Keys of different namespaces never contend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockNamespace {
    /// Bucket records.
    Bucket,
    /// Object records, keyed `bucket/name`.
    Object,
    /// Multipart upload records, keyed by upload id.
    Upload,
    /// Access-key records.
    AccessKey,
    /// Blob reference counts, keyed by cid.
    BlobRef,
}

impl LockNamespace {
    /// Stable prefix used in lock keys and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Object => "object",
            Self::Upload => "upload",
            Self::AccessKey => "accesskey",
            Self::BlobRef => "blobref",
        }
    }
}

impl fmt::Display for LockNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Read,
    Write,
}

type Table = Arc<Mutex<HashMap<String, (Arc<RwLock<()>>, usize)>>>;

/// A counted reference to one table entry. Dropping it decrements the count and
/// removes the entry at zero.
#[derive(Debug)]
struct EntryRef {
    table: Table,
    key: String,
    lock: Arc<RwLock<()>>,
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        if let Some((_, count)) = table.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                table.remove(&self.key);
            }
        }
    }
}

#[derive(Debug)]
enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// A held lock on one resource. Released on drop.
#[derive(Debug)]
pub struct LockGuard {
    // Field order matters: the mutex guard must drop before the entry reference.
    held: Held,
    entry: EntryRef,
}

impl LockGuard {
    /// The `namespace/path` key this guard holds.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.entry.key
    }

    /// Whether this is a shared (read) hold.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self.held, Held::Read(_))
    }

    /// Release the lock now.
    pub fn unlock(self) {
        drop(self);
    }
}

/// Held locks on several resources of one namespace.
#[derive(Debug, Default)]
pub struct MultiLockGuard {
    guards: Vec<LockGuard>,
}

impl MultiLockGuard {
    /// The keys held, in acquisition order.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.guards.iter().map(LockGuard::resource)
    }

    /// Number of distinct resources held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no resources are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every lock now.
    pub fn unlock(self) {
        drop(self);
    }
}

/// The lock table.
///
/// Cloning is cheap; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ResourceLock {
    table: Table,
}

impl ResourceLock {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an exclusive lock on `namespace/path`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::OperationTimedOut`] when the deadline passes first.
    pub async fn lock(
        &self,
        namespace: LockNamespace,
        path: &str,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        self.acquire(key(namespace, path), Mode::Write, Instant::now() + timeout).await
    }

    /// Acquire a shared lock on `namespace/path`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::OperationTimedOut`] when the deadline passes first.
    pub async fn rlock(
        &self,
        namespace: LockNamespace,
        path: &str,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        self.acquire(key(namespace, path), Mode::Read, Instant::now() + timeout).await
    }

    /// Exclusively lock several paths, sorted and deduplicated, under one deadline.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::OperationTimedOut`] for the first path not acquired in
    /// time; every lock already taken is released first.
    pub async fn lock_many(
        &self,
        namespace: LockNamespace,
        paths: &[&str],
        timeout: Duration,
    ) -> Result<MultiLockGuard, LockError> {
        self.acquire_many(namespace, paths, Mode::Write, timeout).await
    }

    /// Shared-lock several paths, sorted and deduplicated, under one deadline.
    ///
    /// # Errors
    ///
    /// As [`ResourceLock::lock_many`].
    pub async fn rlock_many(
        &self,
        namespace: LockNamespace,
        paths: &[&str],
        timeout: Duration,
    ) -> Result<MultiLockGuard, LockError> {
        self.acquire_many(namespace, paths, Mode::Read, timeout).await
    }

    /// Number of keys currently held or waited on.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.table.lock().len()
    }

    async fn acquire_many(
        &self,
        namespace: LockNamespace,
        paths: &[&str],
        mode: Mode,
        timeout: Duration,
    ) -> Result<MultiLockGuard, LockError> {
        let mut sorted: Vec<&str> = paths.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(sorted.len());
        for path in sorted {
            // On error `guards` drops here, releasing what was already taken.
            guards.push(self.acquire(key(namespace, path), mode, deadline).await?);
        }
        Ok(MultiLockGuard { guards })
    }

    async fn acquire(
        &self,
        key: String,
        mode: Mode,
        deadline: Instant,
    ) -> Result<LockGuard, LockError> {
        let entry = self.entry(key);
        let lock = Arc::clone(&entry.lock);

        let held = match mode {
            Mode::Read => timeout_at(deadline, lock.read_owned()).await.map(Held::Read),
            Mode::Write => timeout_at(deadline, lock.write_owned()).await.map(Held::Write),
        };

        match held {
            Ok(held) => Ok(LockGuard { held, entry }),
            Err(_) => {
                debug!(resource = %entry.key, ?mode, "lock acquisition timed out");
                Err(LockError::OperationTimedOut {
                    resource: entry.key.clone(),
                })
            }
        }
    }

    fn entry(&self, key: String) -> EntryRef {
        let mut table = self.table.lock();
        let (lock, count) = table
            .entry(key.clone())
            .or_insert_with(|| (Arc::new(RwLock::new(())), 0));
        *count += 1;
        EntryRef {
            table: Arc::clone(&self.table),
            key,
            lock: Arc::clone(lock),
        }
    }
}

fn key(namespace: LockNamespace, path: &str) -> String {
    format!("{namespace}/{path}")
}
