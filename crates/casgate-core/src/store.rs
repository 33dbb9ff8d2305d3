//! Collaborator stores: content-addressed blobs and key-value metadata.
//!
//! The gateway owns no bytes itself. Content goes to a [`BlobStore`], which
//! returns a content identifier (cid); records go to a [`MetadataStore`] as JSON
//! documents under the key layout
//!
//! ```text
//! bucket/<name>
//! object/<bucket>/<name>
//! multipart/<upload_id>
//! accesskey/<key>
//! blobref/<cid>
//! ```
//!
//! In-memory implementations of both traits back the tests and the bundled
//! server.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::ops::ControlFlow;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// A boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// A request body on its way into the blob store.
pub struct Payload {
    /// The body chunks.
    pub stream: ByteStream,
    /// Declared `Content-Length`, if any.
    pub size: Option<u64>,
    /// Declared `Content-MD5`, if any.
    pub content_md5: Option<String>,
}

impl Payload {
    /// A payload with no declared size or digest.
    #[must_use]
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            size: None,
            content_md5: None,
        }
    }

    /// A payload of in-memory bytes with its size declared.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(Box::pin(futures::stream::once(async move { Ok(data) }))).with_size(size)
    }

    /// Declare the content length.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Declare the base64 `Content-MD5`.
    #[must_use]
    pub fn with_content_md5(mut self, content_md5: impl Into<String>) -> Self {
        self.content_md5 = Some(content_md5.into());
        self
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("size", &self.size)
            .field("content_md5", &self.content_md5)
            .finish_non_exhaustive()
    }
}

/// Chunk size the in-memory blob store streams content back in.
const CAT_CHUNK_SIZE: usize = 64 * 1024;

/// Collaborator store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No blob with this cid exists.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// The content stream failed while being stored.
    #[error("content stream failed: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("invalid metadata record {key}: {source}")]
    Codec {
        /// The metadata key.
        key: String,
        /// The serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The backend itself failed.
    #[error("metadata backend error: {0}")]
    Backend(String),
}

/// Content-addressed blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Consume `content` and persist it, returning its cid.
    ///
    /// A failing stream aborts the store with [`StoreError::Io`] carrying the
    /// stream's own error; nothing is persisted.
    async fn store(&self, content: ByteStream) -> Result<String, StoreError>;

    /// Stream the content of `cid`.
    async fn cat(&self, cid: &str) -> Result<ByteStream, StoreError>;

    /// Delete the content of `cid`. Removing an absent cid succeeds.
    async fn remove(&self, cid: &str) -> Result<(), StoreError>;

    /// Whether `cid` is stored. Defaults to probing with [`BlobStore::cat`].
    async fn exists(&self, cid: &str) -> Result<bool, StoreError> {
        match self.cat(cid).await {
            Ok(_) => Ok(true),
            Err(StoreError::BlobNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Visitor callback for [`MetadataStore::iterate`].
pub type Visitor<'a> = dyn FnMut(&str, &[u8]) -> ControlFlow<()> + Send + 'a;

/// Ordered key-value metadata storage.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Read the record at `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write the record at `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Delete the record at `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Visit every record whose key starts with `prefix`, in ascending key
    /// order, until the visitor breaks.
    async fn iterate(&self, prefix: &str, visitor: &mut Visitor<'_>) -> Result<(), StoreError>;
}

/// Read and decode a JSON record.
///
/// # Errors
///
/// Returns the backend error, or [`StoreError::Codec`] for an undecodable record.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn MetadataStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(key)
        .await?
        .map(|raw| decode(key, &raw))
        .transpose()
}

/// Encode and write a JSON record.
///
/// # Errors
///
/// Returns the backend error, or [`StoreError::Codec`] if encoding fails.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn MetadataStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_vec(value).map_err(|source| StoreError::Codec {
        key: key.to_owned(),
        source,
    })?;
    store.put(key, raw).await
}

/// Collect and decode every JSON record under `prefix`, in key order.
///
/// Stops at `limit` records when one is given.
///
/// # Errors
///
/// Returns the backend error or the first decode failure.
pub async fn scan_json<T: DeserializeOwned + Send>(
    store: &dyn MetadataStore,
    prefix: &str,
    limit: Option<usize>,
) -> Result<Vec<(String, T)>, StoreError> {
    let mut out = Vec::new();
    let mut failure = None;
    store
        .iterate(prefix, &mut |key: &str, raw: &[u8]| {
            match decode(key, raw) {
                Ok(value) => out.push((key.to_owned(), value)),
                Err(err) => {
                    failure = Some(err);
                    return ControlFlow::Break(());
                }
            }
            if limit.is_some_and(|limit| out.len() >= limit) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
    failure.map_or(Ok(out), Err)
}

fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(raw).map_err(|source| StoreError::Codec {
        key: key.to_owned(),
        source,
    })
}

/// In-memory blob store keyed by the hex SHA-256 of the content.
///
/// # Examples
///
/// ```
/// use casgate_core::store::{BlobStore, MemoryBlobStore, Payload};
///
/// # tokio_test::block_on(async {
/// let store = MemoryBlobStore::new();
/// let first = store.store(Payload::from_bytes("abc").stream).await.unwrap();
/// let second = store.store(Payload::from_bytes("abc").stream).await.unwrap();
/// assert_eq!(first, second);
/// assert_eq!(store.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `cid` is stored.
    #[must_use]
    pub fn contains(&self, cid: &str) -> bool {
        self.blobs.contains_key(cid)
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, mut content: ByteStream) -> Result<String, StoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let data = buf.freeze();
        let cid = hex::encode(Sha256::digest(&data));
        self.blobs.entry(cid.clone()).or_insert(data);
        Ok(cid)
    }

    async fn cat(&self, cid: &str) -> Result<ByteStream, StoreError> {
        let data = self
            .blobs
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::BlobNotFound(cid.to_owned()))?;

        let chunks: Vec<Result<Bytes, io::Error>> = (0..data.len())
            .step_by(CAT_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..data.len().min(start + CAT_CHUNK_SIZE))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn remove(&self, cid: &str) -> Result<(), StoreError> {
        self.blobs.remove(cid);
        Ok(())
    }

    async fn exists(&self, cid: &str) -> Result<bool, StoreError> {
        Ok(self.contains(cid))
    }
}

/// In-memory ordered metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.records.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn iterate(&self, prefix: &str, visitor: &mut Visitor<'_>) -> Result<(), StoreError> {
        let records = self.records.read();
        for (key, value) in records
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            if visitor(key, value).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    fn body(parts: &[&'static [u8]]) -> ByteStream {
        let chunks: Vec<Result<Bytes, io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_should_address_blobs_by_content() {
        let store = MemoryBlobStore::new();
        let a = store.store(body(&[b"hel", b"lo"])).await.expect("store");
        let b = store.store(body(&[b"hello"])).await.expect("store");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);

        let content: Vec<Bytes> = store
            .cat(&a)
            .await
            .expect("cat")
            .try_collect()
            .await
            .expect("read");
        assert_eq!(content.concat(), b"hello");

        store.remove(&a).await.expect("remove");
        assert!(matches!(
            store.cat(&a).await,
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_should_not_store_failed_stream() {
        let store = MemoryBlobStore::new();
        let failing: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ]));
        assert!(matches!(
            store.store(failing).await,
            Err(StoreError::Io(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_should_stream_large_blob_in_chunks() {
        let store = MemoryBlobStore::new();
        let data = vec![7u8; CAT_CHUNK_SIZE * 2 + 1];
        let cid = store
            .store(Box::pin(futures::stream::iter(vec![Ok(Bytes::from(
                data.clone(),
            ))])))
            .await
            .expect("store");

        let chunks: Vec<Bytes> = store
            .cat(&cid)
            .await
            .expect("cat")
            .try_collect()
            .await
            .expect("read");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_should_iterate_prefix_in_ascending_order() {
        let store = MemoryMetadataStore::new();
        for key in ["object/b/z", "object/b/a", "object/c/a", "bucket/b"] {
            store.put(key, b"{}".to_vec()).await.expect("put");
        }

        let mut seen = Vec::new();
        store
            .iterate("object/b/", &mut |key: &str, _: &[u8]| {
                seen.push(key.to_owned());
                ControlFlow::Continue(())
            })
            .await
            .expect("iterate");
        assert_eq!(seen, vec!["object/b/a", "object/b/z"]);
    }

    #[tokio::test]
    async fn test_should_stop_iteration_when_visitor_breaks() {
        let store = MemoryMetadataStore::new();
        for key in ["k/1", "k/2", "k/3"] {
            store.put(key, b"{}".to_vec()).await.expect("put");
        }

        let mut seen = 0;
        store
            .iterate("k/", &mut |_: &str, _: &[u8]| {
                seen += 1;
                ControlFlow::Break(())
            })
            .await
            .expect("iterate");
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_should_round_trip_json_records() {
        let store = MemoryMetadataStore::new();
        let record = Record {
            name: "photos".to_owned(),
        };
        put_json(&store, "bucket/photos", &record).await.expect("put");

        let loaded: Option<Record> = get_json(&store, "bucket/photos").await.expect("get");
        assert_eq!(loaded, Some(record));

        let missing: Option<Record> = get_json(&store, "bucket/none").await.expect("get");
        assert!(missing.is_none());

        let all: Vec<(String, Record)> = scan_json(&store, "bucket/", None).await.expect("scan");
        assert_eq!(all.len(), 1);

        store.put("bucket/bad", b"not json".to_vec()).await.expect("put");
        let bad = scan_json::<Record>(&store, "bucket/", None).await;
        assert!(matches!(bad, Err(StoreError::Codec { .. })));
    }
}
