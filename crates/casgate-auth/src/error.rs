//! Error types for request authentication.
//!
//! All authentication failures are represented by [`AuthError`], which provides
//! specific variants for each failure mode encountered while classifying a request,
//! verifying its signature, or decoding a signed chunked body.

use crate::auth_type::AuthType;

/// Errors that can occur during AWS Signature Version 4 authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The signing algorithm is not supported (only AWS4-HMAC-SHA256 is supported).
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required HTTP header referenced in `SignedHeaders` is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The `Credential` component does not match the expected format
    /// (`AKID/date/region/service/aws4_request`).
    #[error("Invalid credential format")]
    InvalidCredential,

    /// The credential scope names a service other than `s3`.
    #[error("Credential scope names unsupported service: {0}")]
    InvalidService(String),

    /// The credential scope date does not match the request timestamp.
    #[error("Credential date does not match request date")]
    CredentialDateMismatch,

    /// The request timestamp could not be parsed.
    #[error("Invalid request date: {0}")]
    InvalidDate(String),

    /// The access key ID was not found in the credential store (or was deleted).
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The access key exists but is disabled.
    #[error("Access key is disabled: {0}")]
    AccessKeyDisabled(String),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// The presigned URL has expired (current time exceeds `X-Amz-Date` + `X-Amz-Expires`).
    #[error("Request has expired")]
    RequestExpired,

    /// `X-Amz-Expires` exceeds the seven day maximum.
    #[error("X-Amz-Expires must be less than a week (in seconds), got {0}")]
    ExpiresTooLarge(u64),

    /// The presigned URL is dated too far in the future.
    #[error("Request is not valid yet")]
    RequestNotReadyYet,

    /// A header-signed request's timestamp is too far from server time.
    #[error("The difference between the request time and the server's time is too large")]
    RequestTimeTooSkewed,

    /// A required query parameter for presigned URL authentication is missing.
    #[error("Missing required query parameter: {0}")]
    MissingQueryParam(String),

    /// The body does not hash to the signed `x-amz-content-sha256` value.
    #[error("The provided 'x-amz-content-sha256' header does not match what was computed")]
    ContentSha256Mismatch,

    /// A chunk of an `aws-chunked` body is malformed.
    #[error("Malformed chunked body: {0}")]
    MalformedChunk(String),

    /// The request uses an authentication scheme this gateway does not serve.
    #[error("Authentication type {0} is not supported")]
    UnsupportedAuthType(AuthType),

    /// The request carries credentials in an unrecognised form.
    #[error("Unknown authentication type")]
    UnknownAuthType,

    /// The credential backend failed while resolving a secret.
    #[error("Credential lookup failed: {0}")]
    Lookup(String),
}
