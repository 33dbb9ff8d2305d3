//! Request authentication type classification.
//!
//! The type is decided once per request, before any signature work, by looking at
//! the `Authorization` header prefix, query-string credentials, the streaming
//! payload sentinel and finally the request shape.

use std::fmt;

/// Payload hash sentinel for requests whose body is not covered by the signature.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Payload hash sentinel announcing an `aws-chunked` body with per-chunk signatures.
pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";

/// How a request claims to be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    /// No credentials at all.
    Anonymous,
    /// `Authorization: AWS AKID:signature`.
    SignedV2,
    /// `?AWSAccessKeyId=..&Signature=..&Expires=..`.
    PresignedV2,
    /// `Authorization: AWS4-HMAC-SHA256 ...`.
    Signed,
    /// `?X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential=...`.
    PresignedV4,
    /// SigV4 header auth with an `aws-chunked` body.
    StreamingSigned,
    /// Browser form upload (`POST` with `multipart/form-data`).
    PostPolicy,
    /// `Authorization: Bearer <token>`.
    Jwt,
    /// Security token service call (`?Action=AssumeRole...`).
    Sts,
    /// Credentials present in a form this gateway cannot recognise.
    Unknown,
}

impl AuthType {
    /// Return a stable name used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::SignedV2 => "SignedV2",
            Self::PresignedV2 => "PresignedV2",
            Self::Signed => "Signed",
            Self::PresignedV4 => "PresignedV4",
            Self::StreamingSigned => "StreamingSigned",
            Self::PostPolicy => "PostPolicy",
            Self::Jwt => "JWT",
            Self::Sts => "STS",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this gateway verifies requests of this type.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Anonymous | Self::Signed | Self::PresignedV4 | Self::StreamingSigned
        )
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request.
///
/// # Examples
///
/// ```
/// use casgate_auth::auth_type::{AuthType, classify};
///
/// let (parts, ()) = http::Request::builder()
///     .uri("/bucket/key?X-Amz-Credential=AK%2F20240101%2Fus-east-1%2Fs3%2Faws4_request")
///     .body(())
///     .unwrap()
///     .into_parts();
/// assert_eq!(classify(&parts), AuthType::PresignedV4);
/// ```
#[must_use]
pub fn classify(parts: &http::request::Parts) -> AuthType {
    if let Some(value) = parts.headers.get(http::header::AUTHORIZATION) {
        let Ok(auth) = value.to_str() else {
            return AuthType::Unknown;
        };
        return classify_authorization(auth, parts);
    }

    let query = parts.uri.query().unwrap_or("");
    if query_has(query, "X-Amz-Credential") {
        return AuthType::PresignedV4;
    }
    if query_has(query, "AWSAccessKeyId") && query_has(query, "Signature") {
        return AuthType::PresignedV2;
    }
    if parts.method == http::Method::POST && is_form_upload(parts) {
        return AuthType::PostPolicy;
    }
    if query_value(query, "Action").is_some_and(|action| action.starts_with("AssumeRole")) {
        return AuthType::Sts;
    }

    AuthType::Anonymous
}

fn classify_authorization(auth: &str, parts: &http::request::Parts) -> AuthType {
    if auth.starts_with("AWS4-HMAC-SHA256") {
        let streaming = parts
            .headers
            .get("x-amz-content-sha256")
            .is_some_and(|v| v.as_bytes() == STREAMING_PAYLOAD.as_bytes());
        if streaming {
            AuthType::StreamingSigned
        } else {
            AuthType::Signed
        }
    } else if auth.starts_with("AWS ") {
        AuthType::SignedV2
    } else if auth.starts_with("Bearer ") {
        AuthType::Jwt
    } else {
        AuthType::Unknown
    }
}

fn is_form_upload(parts: &http::request::Parts) -> bool {
    parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

fn query_has(query: &str, name: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.split_once('=').map_or(pair, |(k, _)| k) == name)
}

fn query_value<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}
