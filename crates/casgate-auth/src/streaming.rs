//! Decoder for `aws-chunked` bodies signed with `STREAMING-AWS4-HMAC-SHA256-PAYLOAD`.
//!
//! Each chunk is framed as
//!
//! ```text
//! <hex-size>;chunk-signature=<64 hex>\r\n
//! <data>\r\n
//! ```
//!
//! and the stream ends with a zero-sized chunk. Every chunk signature chains off
//! the previous one, seeded with the request's header signature, so chunks can be
//! neither reordered nor dropped.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::sigv4::{AuthResult, compute_signature, hash_payload, signatures_match};

const PAYLOAD_ALGORITHM: &str = "AWS4-HMAC-SHA256-PAYLOAD";
const SIGNATURE_PREFIX: &str = "chunk-signature=";
const MAX_CHUNK_HEADER_LEN: usize = 4096;

/// Largest chunk a client may declare. SDKs send 64 KiB to 8 MiB chunks.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Signing material for a chunk signature chain.
#[derive(Clone)]
pub struct ChunkSigner {
    signing_key: Vec<u8>,
    timestamp: String,
    scope: String,
    previous_signature: String,
}

impl ChunkSigner {
    /// Start a chain from a verified request.
    #[must_use]
    pub fn from_auth(auth: &AuthResult) -> Self {
        Self::new(
            auth.signing_key.clone(),
            auth.timestamp.clone(),
            auth.scope(),
            auth.signature.clone(),
        )
    }

    /// Start a chain from raw signing material.
    #[must_use]
    pub fn new(signing_key: Vec<u8>, timestamp: String, scope: String, seed: String) -> Self {
        Self {
            signing_key,
            timestamp,
            scope,
            previous_signature: seed,
        }
    }

    /// Compute the signature of the next chunk and advance the chain.
    pub fn sign_next(&mut self, data: &[u8]) -> String {
        let string_to_sign = format!(
            "{PAYLOAD_ALGORITHM}\n{}\n{}\n{}\n{}\n{}",
            self.timestamp,
            self.scope,
            self.previous_signature,
            hash_payload(b""),
            hex::encode(Sha256::digest(data)),
        );
        let signature = compute_signature(&self.signing_key, &string_to_sign);
        self.previous_signature.clone_from(&signature);
        signature
    }
}

pin_project! {
    /// A stream adapter that strips chunk framing and verifies every chunk signature.
    ///
    /// Yields the decoded payload. A framing or signature failure surfaces as an
    /// [`io::ErrorKind::InvalidData`] error wrapping an [`AuthError`].
    pub struct SignedChunkDecoder<S> {
        #[pin]
        inner: S,
        buffer: BytesMut,
        signer: Option<ChunkSigner>,
        inner_done: bool,
        finished: bool,
    }
}

impl<S> SignedChunkDecoder<S> {
    /// Wrap `inner`, verifying chunks against `signer`.
    pub fn new(inner: S, signer: ChunkSigner) -> Self {
        Self::with_signer(inner, Some(signer))
    }

    /// Wrap `inner`, stripping the framing without checking chunk signatures.
    ///
    /// Used when signature validation is switched off for the gateway.
    pub fn unverified(inner: S) -> Self {
        Self::with_signer(inner, None)
    }

    fn with_signer(inner: S, signer: Option<ChunkSigner>) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            signer,
            inner_done: false,
            finished: false,
        }
    }
}

enum Parsed {
    NeedMore,
    Chunk(Bytes),
    End,
}

fn malformed(reason: impl Into<String>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        AuthError::MalformedChunk(reason.into()),
    )
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn try_parse_chunk(buffer: &mut BytesMut, signer: Option<&mut ChunkSigner>) -> io::Result<Parsed> {
    let Some(header_end) = find_crlf(buffer) else {
        if buffer.len() > MAX_CHUNK_HEADER_LEN {
            return Err(malformed("chunk header too long"));
        }
        return Ok(Parsed::NeedMore);
    };

    let header =
        std::str::from_utf8(&buffer[..header_end]).map_err(|_| malformed("non-utf8 header"))?;
    let (size_hex, extension) = header
        .split_once(';')
        .ok_or_else(|| malformed("missing chunk signature"))?;
    let size = usize::from_str_radix(size_hex.trim(), 16)
        .map_err(|_| malformed(format!("invalid chunk size {size_hex:?}")))?;
    let claimed = extension
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| malformed("missing chunk signature"))?
        .to_owned();

    if size > MAX_CHUNK_SIZE {
        return Err(malformed(format!(
            "chunk size {size} exceeds the maximum of {MAX_CHUNK_SIZE}"
        )));
    }

    let data_start = header_end + 2;
    let data_end = data_start
        .checked_add(size)
        .ok_or_else(|| malformed("chunk size overflows"))?;
    let total = data_end
        .checked_add(2)
        .ok_or_else(|| malformed("chunk size overflows"))?;
    if buffer.len() < total {
        return Ok(Parsed::NeedMore);
    }
    if &buffer[data_end..total] != b"\r\n" {
        return Err(malformed("chunk data not terminated by CRLF"));
    }

    buffer.advance(data_start);
    let data = buffer.split_to(size).freeze();
    buffer.advance(2);

    if let Some(signer) = signer {
        let expected = signer.sign_next(&data);
        if !signatures_match(&claimed, &expected) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                AuthError::SignatureDoesNotMatch,
            ));
        }
    }

    Ok(if size == 0 {
        Parsed::End
    } else {
        Parsed::Chunk(data)
    })
}

impl<S> Stream for SignedChunkDecoder<S>
where
    S: Stream<Item = Result<Bytes, io::Error>>,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.finished {
                return Poll::Ready(None);
            }

            match try_parse_chunk(this.buffer, this.signer.as_mut()) {
                Ok(Parsed::Chunk(data)) => return Poll::Ready(Some(Ok(data))),
                Ok(Parsed::End) => {
                    *this.finished = true;
                    return Poll::Ready(None);
                }
                Ok(Parsed::NeedMore) => {}
                Err(err) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
            }

            if *this.inner_done {
                *this.finished = true;
                return Poll::Ready(Some(Err(malformed("body ended before final chunk"))));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(err))) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => *this.inner_done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pin_project! {
    /// A stream adapter that checks a plain body against its signed SHA-256.
    ///
    /// Bytes pass through untouched; when the inner stream ends, the digest of
    /// everything seen is compared with `expected` and a mismatch surfaces as an
    /// [`io::ErrorKind::InvalidData`] error wrapping
    /// [`AuthError::ContentSha256Mismatch`].
    pub struct PayloadHashVerifier<S> {
        #[pin]
        inner: S,
        hasher: Sha256,
        expected: String,
        finished: bool,
    }
}

impl<S> PayloadHashVerifier<S> {
    /// Wrap `inner`, expecting it to hash to the lowercase hex `expected`.
    pub fn new(inner: S, expected: impl Into<String>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            expected: expected.into(),
            finished: false,
        }
    }
}

impl<S> Stream for PayloadHashVerifier<S>
where
    S: Stream<Item = Result<Bytes, io::Error>>,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.hasher.update(&bytes);
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.finished = true;
                let actual = hex::encode(this.hasher.finalize_reset());
                if actual.eq_ignore_ascii_case(this.expected) {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        AuthError::ContentSha256Mismatch,
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt, stream};

    use super::*;
    use crate::sigv4::derive_signing_key;

    const SEED: &str = "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9";

    fn signer() -> ChunkSigner {
        ChunkSigner::new(
            derive_signing_key(
                "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
                "20130524",
                "us-east-1",
            ),
            "20130524T000000Z".to_owned(),
            "20130524/us-east-1/s3/aws4_request".to_owned(),
            SEED.to_owned(),
        )
    }

    fn encode(chunks: &[&[u8]]) -> Vec<u8> {
        let mut signer = signer();
        let mut out = Vec::new();
        for data in chunks.iter().copied().chain(std::iter::once(&b""[..])) {
            let sig = signer.sign_next(data);
            out.extend_from_slice(format!("{:x};chunk-signature={sig}\r\n", data.len()).as_bytes());
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    async fn decode(body: Vec<u8>, piece: usize) -> io::Result<Vec<u8>> {
        let pieces: Vec<io::Result<Bytes>> = body
            .chunks(piece)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let decoder = SignedChunkDecoder::new(stream::iter(pieces), signer());
        let parts: Vec<Bytes> = decoder.try_collect().await?;
        Ok(parts.concat())
    }

    fn auth_error(err: &io::Error) -> Option<&AuthError> {
        err.get_ref().and_then(|e| e.downcast_ref::<AuthError>())
    }

    #[tokio::test]
    async fn test_should_decode_signed_chunks_across_arbitrary_splits() {
        let payload: Vec<u8> = (0..200u8).collect();
        let body = encode(&[&payload[..64], &payload[64..]]);

        for piece in [1, 7, 64, body.len()] {
            let decoded = decode(body.clone(), piece).await.expect("valid body");
            assert_eq!(decoded, payload, "piece size {piece}");
        }
    }

    #[tokio::test]
    async fn test_should_reject_tampered_chunk_data() {
        let mut body = encode(&[b"hello world"]);
        let pos = body
            .windows(5)
            .position(|w| w == b"hello")
            .expect("payload present");
        body[pos] = b'j';

        let err = decode(body, 16).await.expect_err("tampered body");
        assert_eq!(auth_error(&err), Some(&AuthError::SignatureDoesNotMatch));
    }

    #[tokio::test]
    async fn test_should_reject_truncated_body() {
        let body = encode(&[b"hello world"]);
        let truncated = body[..body.len() - 10].to_vec();

        let err = decode(truncated, 16).await.expect_err("truncated body");
        assert!(matches!(
            auth_error(&err),
            Some(AuthError::MalformedChunk(_))
        ));
    }

    #[tokio::test]
    async fn test_should_reject_chunk_without_signature() {
        let body = b"5\r\nhello\r\n0\r\n\r\n".to_vec();
        let mut decoder = SignedChunkDecoder::new(
            stream::iter(vec![Ok::<_, io::Error>(Bytes::from(body))]),
            signer(),
        );

        let first = decoder.next().await.expect("an item");
        assert!(first.is_err());
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_should_strip_framing_without_verifying() {
        let mut body = encode(&[b"hello world"]);
        let pos = body
            .windows(16)
            .position(|w| w == b"chunk-signature=")
            .expect("signature present");
        body[pos + 16] = if body[pos + 16] == b'0' { b'1' } else { b'0' };

        let decoder = SignedChunkDecoder::unverified(stream::iter(vec![Ok::<_, io::Error>(
            Bytes::from(body),
        )]));
        let parts: Vec<Bytes> = decoder.try_collect().await.expect("framing is valid");
        assert_eq!(parts.concat(), b"hello world");
    }

    #[tokio::test]
    async fn test_should_reject_overflowing_chunk_size() {
        let body = b"ffffffffffffffff;chunk-signature=00\r\nabc".to_vec();
        for piece in [1, 64] {
            let err = decode(body.clone(), piece)
                .await
                .expect_err("size overflows");
            assert!(matches!(
                auth_error(&err),
                Some(AuthError::MalformedChunk(_))
            ));
        }

        let decoder = SignedChunkDecoder::unverified(stream::iter(vec![Ok::<_, io::Error>(
            Bytes::from(body),
        )]));
        let err = decoder
            .try_collect::<Vec<Bytes>>()
            .await
            .expect_err("size overflows");
        assert!(matches!(
            auth_error(&err),
            Some(AuthError::MalformedChunk(_))
        ));
    }

    #[tokio::test]
    async fn test_should_reject_chunk_larger_than_maximum() {
        let header = format!("{:x};chunk-signature={SEED}\r\n", MAX_CHUNK_SIZE + 1);
        let mut body = header.into_bytes();
        body.extend_from_slice(b"only a little data");

        let err = decode(body, 8).await.expect_err("oversized chunk");
        assert!(matches!(
            auth_error(&err),
            Some(AuthError::MalformedChunk(_))
        ));
    }

    #[tokio::test]
    async fn test_should_accept_chunk_at_maximum_size() {
        let payload = vec![b'x'; MAX_CHUNK_SIZE];
        let body = encode(&[&payload]);
        let decoded = decode(body, 1024 * 1024).await.expect("chunk at the limit");
        assert_eq!(decoded.len(), MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_should_verify_plain_payload_hash() {
        let pieces = || {
            stream::iter(vec![
                Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
                Ok(Bytes::from_static(b"world")),
            ])
        };

        let good = PayloadHashVerifier::new(pieces(), hash_payload(b"hello world"));
        let parts: Vec<Bytes> = good.try_collect().await.expect("hash matches");
        assert_eq!(parts.concat(), b"hello world");

        let bad = PayloadHashVerifier::new(pieces(), hash_payload(b"goodbye"));
        let err = bad
            .try_collect::<Vec<Bytes>>()
            .await
            .expect_err("hash differs");
        assert_eq!(auth_error(&err), Some(&AuthError::ContentSha256Mismatch));
    }
}
