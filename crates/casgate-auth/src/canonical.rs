//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Every component is normalized so that the server reproduces the exact bytes the
//! client signed. Header values are supplied by the caller already resolved (see
//! [`crate::sigv4::collect_signed_headers`]), so this module is a pure function of
//! its inputs.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::{Digest, Sha256};

/// Characters left unencoded in canonical URI segments: `A-Z a-z 0-9 - _ . ~`.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The query parameter carrying a presigned URL's signature; never part of the
/// canonical query.
pub const SIGNATURE_QUERY_PARAM: &str = "X-Amz-Signature";

/// A fully resolved canonical request.
///
/// # Examples
///
/// ```
/// use casgate_auth::canonical::CanonicalRequest;
///
/// let headers = [("host".to_owned(), "examplebucket.s3.amazonaws.com".to_owned())];
/// let req = CanonicalRequest::new("GET", "/test.txt", "", &headers, "UNSIGNED-PAYLOAD");
/// assert!(req.to_string().starts_with("GET\n/test.txt\n\nhost:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    method: String,
    uri: String,
    query: String,
    headers: String,
    signed_headers: String,
    payload_hash: String,
}

impl CanonicalRequest {
    /// Build a canonical request.
    ///
    /// `headers` holds the (lowercase name, raw value) pairs of exactly the signed
    /// headers; `query` is the raw query string, from which any
    /// `X-Amz-Signature` parameter is dropped.
    #[must_use]
    pub fn new(
        method: &str,
        path: &str,
        query: &str,
        headers: &[(String, String)],
        payload_hash: &str,
    ) -> Self {
        let names: Vec<&str> = headers.iter().map(|(name, _)| name.as_str()).collect();
        Self {
            method: method.to_owned(),
            uri: canonical_uri(path),
            query: canonical_query_string(query),
            headers: canonical_headers(headers),
            signed_headers: signed_headers_string(&names),
            payload_hash: payload_hash.to_owned(),
        }
    }

    /// Hex-encoded SHA-256 of the canonical request, the last line of the
    /// string to sign.
    #[must_use]
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.to_string().as_bytes()))
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n\n{}\n{}",
            self.method,
            self.uri,
            self.query,
            self.headers,
            self.signed_headers,
            self.payload_hash
        )
    }
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Segments are decoded first so an already-encoded path is not encoded twice.
/// Empty paths are normalized to `/`.
///
/// # Examples
///
/// ```
/// use casgate_auth::canonical::canonical_uri;
///
/// assert_eq!(canonical_uri("/test.txt"), "/test.txt");
/// assert_eq!(canonical_uri(""), "/");
/// assert_eq!(canonical_uri("/a b/c"), "/a%20b/c");
/// ```
#[must_use]
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string: raw `k=v` pairs sorted by key then value.
///
/// Values are kept exactly as they appear on the wire; clients differ in which
/// reserved characters they encode and the server must use the client's bytes.
/// Valueless parameters (`?acl`) become `acl=`.
///
/// # Examples
///
/// ```
/// use casgate_auth::canonical::canonical_query_string;
///
/// assert_eq!(canonical_query_string("b=2&a=1&acl"), "a=1&acl=&b=2");
/// ```
#[must_use]
pub fn canonical_query_string(query: &str) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .filter(|(key, _)| *key != SIGNATURE_QUERY_PARAM)
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block (without its trailing newline).
///
/// Names are lowercased, values trimmed with inner whitespace runs collapsed, and
/// repeated names joined with commas in arrival order.
#[must_use]
pub fn canonical_headers(headers: &[(String, String)]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let trimmed = collapse_whitespace(value.trim());
        header_map
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed);
            })
            .or_insert(trimmed);
    }

    header_map
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the signed headers string: sorted, deduplicated, `;`-separated names.
///
/// # Examples
///
/// ```
/// use casgate_auth::canonical::signed_headers_string;
///
/// assert_eq!(signed_headers_string(&["x-amz-date", "host"]), "host;x-amz-date");
/// ```
#[must_use]
pub fn signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(";")
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
