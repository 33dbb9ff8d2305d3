//! S3 response body types supporting buffered, streaming and empty modes.
//!
//! This module provides [`S3ResponseBody`], the HTTP response body type used throughout
//! the S3 HTTP service. It supports three modes:
//!
//! - **Buffered**: For small responses such as XML payloads and error bodies.
//! - **Streaming**: For object content, read from the blob store as the client drains it.
//! - **Empty**: For responses with no body content (e.g., 204 No Content, HEAD responses).
//!
//! It also converts hyper's request body into the [`ByteStream`] the gateway consumes.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use casgate_core::store::ByteStream;
use futures::{Stream, TryStreamExt};
use http_body_util::{BodyExt, Full};

/// S3 response body supporting buffered, streaming and empty modes.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Default)]
pub enum S3ResponseBody {
    /// Buffered body for small responses: XML payloads, error bodies.
    Buffered(Full<Bytes>),
    /// Object content with its length, when known.
    Streaming {
        /// The content chunks.
        stream: ByteStream,
        /// Total length in bytes.
        size: Option<u64>,
    },
    /// Empty body for 204 responses, DELETE confirmations, HEAD responses, etc.
    #[default]
    Empty,
}

impl fmt::Debug for S3ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Streaming { size, .. } => f
                .debug_struct("Streaming")
                .field("size", size)
                .finish_non_exhaustive(),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl S3ResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a buffered body from an XML byte vector.
    #[must_use]
    pub fn from_xml(xml: Vec<u8>) -> Self {
        Self::Buffered(Full::new(Bytes::from(xml)))
    }

    /// Create a streaming body of `size` bytes.
    #[must_use]
    pub fn from_stream(stream: ByteStream, size: Option<u64>) -> Self {
        Self::Streaming { stream, size }
    }
}

impl http_body::Body for S3ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming { stream, .. } => stream
                .as_mut()
                .poll_next(cx)
                .map(|item| item.map(|chunk| chunk.map(http_body::Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming { size, .. } => *size == Some(0),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming {
                size: Some(size), ..
            } => http_body::SizeHint::with_exact(*size),
            Self::Streaming { size: None, .. } => http_body::SizeHint::default(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

/// Adapt any request body into a [`ByteStream`] of its data frames.
///
/// Trailers are dropped; body errors surface as [`io::Error`]s.
pub fn into_byte_stream<B>(body: B) -> ByteStream
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    Box::pin(body.into_data_stream().map_err(io::Error::other))
}

/// A [`ByteStream`] over bytes already in memory.
#[must_use]
pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Failure to buffer a request body.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The body grew past the limit; reading stopped there.
    #[error("request body exceeds {limit} bytes")]
    TooLarge {
        /// The limit that was passed.
        limit: u64,
    },
    /// The body stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read a stream to its end, holding at most `limit` bytes.
///
/// Stops at the first chunk that takes the total past `limit`.
pub async fn collect_limited(mut stream: ByteStream, limit: u64) -> Result<Bytes, CollectError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        let total = u64::try_from(buf.len() + chunk.len()).unwrap_or(u64::MAX);
        if total > limit {
            return Err(CollectError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
