//! ETag computation and parsing.
//!
//! Single-part ETags are the hex MD5 of the content, computed while the content
//! streams into the blob store by [`EtagStream`]. Multipart ETags aggregate the
//! member ETags (see [`multipart_etag`]). ETags are stored unquoted; the HTTP
//! layer adds the quotes.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use futures::Stream;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use pin_project_lite::pin_project;

use crate::error::ServiceError;

/// The computed digest did not match the caller-declared `Content-MD5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Content-MD5 does not match the received content")]
pub struct DigestMismatch;

/// Digest and length of a fully consumed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    /// Raw MD5 digest.
    pub md5: [u8; 16],
    /// Number of bytes that passed through.
    pub size: u64,
}

impl Fingerprint {
    /// The hex ETag of the content.
    #[must_use]
    pub fn etag(&self) -> String {
        hex::encode(self.md5)
    }
}

/// Read side of an [`EtagStream`]: yields the fingerprint once the stream ended
/// cleanly.
#[derive(Debug, Clone, Default)]
pub struct EtagHandle {
    outcome: Arc<Mutex<Option<Fingerprint>>>,
}

impl EtagHandle {
    /// The fingerprint, or `None` if the stream has not been fully consumed or
    /// ended in an error.
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        *self.outcome.lock()
    }
}

pin_project! {
    /// A pass-through stream that MD5-hashes everything it yields.
    ///
    /// When a declared digest is given and does not match, the stream ends with
    /// an [`io::ErrorKind::InvalidData`] error wrapping [`DigestMismatch`]
    /// instead of ending cleanly, so a consumer never commits mismatched content.
    pub struct EtagStream<S> {
        #[pin]
        inner: S,
        hasher: Md5,
        size: u64,
        expected: Option<[u8; 16]>,
        outcome: Arc<Mutex<Option<Fingerprint>>>,
        done: bool,
    }
}

impl<S> EtagStream<S> {
    /// Wrap `inner`, optionally verifying against a declared MD5.
    pub fn new(inner: S, expected: Option<[u8; 16]>) -> (Self, EtagHandle) {
        let handle = EtagHandle::default();
        let stream = Self {
            inner,
            hasher: Md5::new(),
            size: 0,
            expected,
            outcome: Arc::clone(&handle.outcome),
            done: false,
        };
        (stream, handle)
    }
}

impl<S> Stream for EtagStream<S>
where
    S: Stream<Item = Result<Bytes, io::Error>>,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.hasher.update(&bytes);
                *this.size += bytes.len() as u64;
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.done = true;
                let mut md5 = [0u8; 16];
                md5.copy_from_slice(&std::mem::take(this.hasher).finalize());
                if this.expected.is_some_and(|expected| expected != md5) {
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        DigestMismatch,
                    ))));
                }
                *this.outcome.lock() = Some(Fingerprint {
                    md5,
                    size: *this.size,
                });
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Decode a `Content-MD5` header (base64 of the raw 16-byte digest).
///
/// # Errors
///
/// Returns [`ServiceError::InvalidDigest`] for anything that is not base64 of
/// exactly 16 bytes.
///
/// # Examples
///
/// ```
/// use casgate_core::etag::parse_content_md5;
///
/// let digest = parse_content_md5("XUFAKrxLKna5cZ2REBfFkg==").unwrap();
/// assert_eq!(hex::encode(digest), "5d41402abc4b2a76b9719d911017c592");
/// assert!(parse_content_md5("not-base64").is_err());
/// ```
pub fn parse_content_md5(value: &str) -> Result<[u8; 16], ServiceError> {
    let decoded = BASE64_STANDARD
        .decode(value.trim())
        .map_err(|_| ServiceError::InvalidDigest)?;
    <[u8; 16]>::try_from(decoded.as_slice()).map_err(|_| ServiceError::InvalidDigest)
}

/// Hex MD5 of an in-memory buffer.
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// The three ETag shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtagKind {
    /// A plain 16-byte MD5 digest.
    Plain([u8; 16]),
    /// An aggregate `hex-count` multipart ETag.
    Multipart {
        /// Number of parts the aggregate covers.
        count: u32,
    },
    /// An opaque ETag longer than a digest with no separator.
    Encrypted,
}

/// Strip surrounding quotes from an ETag.
#[must_use]
pub fn canonicalize(etag: &str) -> &str {
    let etag = etag.trim();
    etag.strip_prefix('"')
        .and_then(|e| e.strip_suffix('"'))
        .unwrap_or(etag)
}

/// Classify an ETag. Returns `None` for values of no recognized shape.
#[must_use]
pub fn parse_etag(etag: &str) -> Option<EtagKind> {
    let etag = canonicalize(etag);

    if let Some((digest, count)) = etag.rsplit_once('-') {
        let count = count.parse::<u32>().ok()?;
        return (is_hex_digest(digest)).then_some(EtagKind::Multipart { count });
    }

    if is_hex_digest(etag) {
        let mut raw = [0u8; 16];
        hex::decode_to_slice(etag, &mut raw).ok()?;
        return Some(EtagKind::Plain(raw));
    }

    (etag.len() > 16).then_some(EtagKind::Encrypted)
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Aggregate ETag of a multipart object.
///
/// `hex(MD5(raw digest of each plain member, in order)) + "-" + member count`.
/// Multipart and encrypted members contribute no bytes but are counted.
///
/// # Examples
///
/// ```
/// use casgate_core::etag::multipart_etag;
///
/// let etag = multipart_etag(["5d41402abc4b2a76b9719d911017c592"]);
/// assert!(etag.ends_with("-1"));
/// ```
#[must_use]
pub fn multipart_etag<'a>(etags: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Md5::new();
    let mut count = 0usize;
    for etag in etags {
        count += 1;
        if let Some(EtagKind::Plain(raw)) = parse_etag(etag) {
            hasher.update(raw);
        }
    }
    format!("{}-{count}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt, stream};

    use super::*;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const WORLD_MD5: &str = "7d793037a0760186574b0282f2f435e7";

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_should_expose_digest_only_after_full_consumption() {
        let (mut stream, handle) = EtagStream::new(chunks(&[b"hel", b"lo"]), None);

        let first = stream.next().await.expect("chunk").expect("ok");
        assert_eq!(&first[..], b"hel");
        assert!(handle.fingerprint().is_none());

        while let Some(chunk) = stream.next().await {
            chunk.expect("ok");
        }
        let fp = handle.fingerprint().expect("complete");
        assert_eq!(fp.etag(), HELLO_MD5);
        assert_eq!(fp.size, 5);
    }

    #[tokio::test]
    async fn test_should_fail_stream_on_declared_digest_mismatch() {
        let wrong = parse_content_md5("AAAAAAAAAAAAAAAAAAAAAA==").expect("valid base64");
        let (stream, handle) = EtagStream::new(chunks(&[b"hello"]), Some(wrong));

        let err = stream
            .try_collect::<Vec<Bytes>>()
            .await
            .expect_err("mismatch");
        assert!(err.get_ref().is_some_and(|e| e.is::<DigestMismatch>()));
        assert!(handle.fingerprint().is_none());
    }

    #[tokio::test]
    async fn test_should_accept_matching_declared_digest() {
        let declared = parse_content_md5("XUFAKrxLKna5cZ2REBfFkg==").expect("valid");
        let (stream, handle) = EtagStream::new(chunks(&[b"he", b"llo"]), Some(declared));
        stream.try_collect::<Vec<Bytes>>().await.expect("match");
        assert_eq!(handle.fingerprint().map(|f| f.etag()).as_deref(), Some(HELLO_MD5));
    }

    #[test]
    fn test_should_reject_malformed_content_md5() {
        assert!(matches!(
            parse_content_md5("%%%"),
            Err(ServiceError::InvalidDigest)
        ));
        assert!(matches!(
            parse_content_md5("aGVsbG8="),
            Err(ServiceError::InvalidDigest)
        ));
    }

    #[test]
    fn test_should_classify_etag_shapes() {
        assert!(matches!(parse_etag(HELLO_MD5), Some(EtagKind::Plain(_))));
        assert!(matches!(
            parse_etag(&format!("\"{HELLO_MD5}\"")),
            Some(EtagKind::Plain(_))
        ));
        assert_eq!(
            parse_etag(&format!("{HELLO_MD5}-12")),
            Some(EtagKind::Multipart { count: 12 })
        );
        assert_eq!(
            parse_etag("YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXo0NTY3ODkw"),
            Some(EtagKind::Encrypted)
        );
        assert_eq!(parse_etag("short"), None);
    }

    #[test]
    fn test_should_compute_order_sensitive_stable_multipart_etag() {
        let forward = multipart_etag([HELLO_MD5, WORLD_MD5]);
        let again = multipart_etag([HELLO_MD5, WORLD_MD5]);
        let reversed = multipart_etag([WORLD_MD5, HELLO_MD5]);

        assert_eq!(forward, again);
        assert_ne!(forward, reversed);
        assert!(forward.ends_with("-2"));

        let mut raw = Vec::new();
        raw.extend_from_slice(&hex::decode(HELLO_MD5).expect("hex"));
        raw.extend_from_slice(&hex::decode(WORLD_MD5).expect("hex"));
        assert_eq!(forward, format!("{}-2", compute_md5(&raw)));
    }

    #[test]
    fn test_should_ignore_quotes_and_skip_non_plain_members() {
        let quoted = multipart_etag([&*format!("\"{HELLO_MD5}\"")]);
        assert_eq!(quoted, multipart_etag([HELLO_MD5]));

        let with_nested = multipart_etag([HELLO_MD5, &*format!("{WORLD_MD5}-3")]);
        let expected = format!(
            "{}-2",
            compute_md5(&hex::decode(HELLO_MD5).expect("hex"))
        );
        assert_eq!(with_nested, expected);
    }
}
