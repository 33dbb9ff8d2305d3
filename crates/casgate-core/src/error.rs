//! Gateway error types.
//!
//! [`ServiceError`] is the domain error every bucket, object, multipart and
//! access-key operation returns. Each variant maps to exactly one wire-level
//! [`S3ErrorCode`], which in turn fixes the HTTP status.
//!
//! ```
//! use casgate_core::error::{S3ErrorCode, ServiceError};
//!
//! let err = ServiceError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! assert_eq!(err.code(), S3ErrorCode::NoSuchBucket);
//! assert_eq!(err.code().default_status_code(), http::StatusCode::NOT_FOUND);
//! ```

use std::fmt;
use std::io;

use crate::etag::DigestMismatch;
use crate::lock::LockError;
use crate::store::StoreError;

/// S3 error codes the gateway can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum S3ErrorCode {
    /// AccessDenied error.
    #[default]
    AccessDenied,
    /// BadDigest error.
    BadDigest,
    /// BucketAlreadyExists error.
    BucketAlreadyExists,
    /// BucketAlreadyOwnedByYou error.
    BucketAlreadyOwnedByYou,
    /// BucketNotEmpty error.
    BucketNotEmpty,
    /// EntityTooLarge error.
    EntityTooLarge,
    /// EntityTooSmall error.
    EntityTooSmall,
    /// ExpiredPresignRequest error.
    ExpiredPresignRequest,
    /// IncompleteBody error.
    IncompleteBody,
    /// InternalError error.
    InternalError,
    /// InvalidAccessKeyId error.
    InvalidAccessKeyId,
    /// InvalidArgument error.
    InvalidArgument,
    /// InvalidBucketName error.
    InvalidBucketName,
    /// InvalidDigest error.
    InvalidDigest,
    /// InvalidPart error.
    InvalidPart,
    /// InvalidPartOrder error.
    InvalidPartOrder,
    /// InvalidRequest error.
    InvalidRequest,
    /// MalformedXML error.
    MalformedXML,
    /// MethodNotAllowed error.
    MethodNotAllowed,
    /// MissingContentLength error.
    MissingContentLength,
    /// NoSuchBucket error.
    NoSuchBucket,
    /// NoSuchKey error.
    NoSuchKey,
    /// NoSuchUpload error.
    NoSuchUpload,
    /// NotImplemented error.
    NotImplemented,
    /// RequestNotReadyYet error.
    RequestNotReadyYet,
    /// RequestTimeTooSkewed error.
    RequestTimeTooSkewed,
    /// SignatureDoesNotMatch error.
    SignatureDoesNotMatch,
    /// SlowDown error.
    SlowDown,
    /// XAmzContentSHA256Mismatch error.
    XAmzContentSHA256Mismatch,
}

impl S3ErrorCode {
    /// Returns the error code as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BadDigest => "BadDigest",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::EntityTooLarge => "EntityTooLarge",
            Self::EntityTooSmall => "EntityTooSmall",
            Self::ExpiredPresignRequest => "ExpiredPresignRequest",
            Self::IncompleteBody => "IncompleteBody",
            Self::InternalError => "InternalError",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidDigest => "InvalidDigest",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::MissingContentLength => "MissingContentLength",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NotImplemented => "NotImplemented",
            Self::RequestNotReadyYet => "RequestNotReadyYet",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::SlowDown => "SlowDown",
            Self::XAmzContentSHA256Mismatch => "XAmzContentSHA256Mismatch",
        }
    }

    /// Returns the default HTTP status code for this error.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::BadDigest
            | Self::EntityTooLarge
            | Self::EntityTooSmall
            | Self::IncompleteBody
            | Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidDigest
            | Self::InvalidPart
            | Self::InvalidPartOrder
            | Self::InvalidRequest
            | Self::MalformedXML
            | Self::XAmzContentSHA256Mismatch => http::StatusCode::BAD_REQUEST,
            Self::AccessDenied
            | Self::ExpiredPresignRequest
            | Self::InvalidAccessKeyId
            | Self::RequestNotReadyYet
            | Self::RequestTimeTooSkewed
            | Self::SignatureDoesNotMatch => http::StatusCode::FORBIDDEN,
            Self::NoSuchBucket | Self::NoSuchKey | Self::NoSuchUpload => {
                http::StatusCode::NOT_FOUND
            }
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::BucketAlreadyExists | Self::BucketAlreadyOwnedByYou | Self::BucketNotEmpty => {
                http::StatusCode::CONFLICT
            }
            Self::MissingContentLength => http::StatusCode::LENGTH_REQUIRED,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
            Self::SlowDown => http::StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the default human-readable message for this error.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::BadDigest => "The Content-MD5 you specified did not match what we received.",
            Self::BucketAlreadyExists => {
                "The requested bucket name is not available. The bucket namespace is shared by all users of the system."
            }
            Self::BucketAlreadyOwnedByYou => {
                "Your previous request to create the named bucket succeeded and you already own it."
            }
            Self::BucketNotEmpty => "The bucket you tried to delete is not empty",
            Self::EntityTooLarge => "Your proposed upload exceeds the maximum allowed object size.",
            Self::EntityTooSmall => {
                "Your proposed upload is smaller than the minimum allowed object size."
            }
            Self::ExpiredPresignRequest => "Request has expired",
            Self::IncompleteBody => {
                "You did not provide the number of bytes specified by the Content-Length HTTP header."
            }
            Self::InternalError => "We encountered an internal error, please try again.",
            Self::InvalidAccessKeyId => {
                "The Access Key Id you provided does not exist in our records."
            }
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidBucketName => "The specified bucket is not valid.",
            Self::InvalidDigest => "The Content-MD5 you specified is not valid.",
            Self::InvalidPart => {
                "One or more of the specified parts could not be found. The part may not have been uploaded, or the specified entity tag may not match the part's entity tag."
            }
            Self::InvalidPartOrder => {
                "The list of parts was not in ascending order. The parts list must be specified in order by part number."
            }
            Self::InvalidRequest => "Invalid Request",
            Self::MalformedXML => {
                "The XML you provided was not well-formed or did not validate against our published schema."
            }
            Self::MethodNotAllowed => "The specified method is not allowed against this resource.",
            Self::MissingContentLength => "You must provide the Content-Length HTTP header.",
            Self::NoSuchBucket => "The specified bucket does not exist",
            Self::NoSuchKey => "The specified key does not exist.",
            Self::NoSuchUpload => {
                "The specified multipart upload does not exist. The upload ID may be invalid, or the upload may have been aborted or completed."
            }
            Self::NotImplemented => {
                "A header you provided implies functionality that is not implemented"
            }
            Self::RequestNotReadyYet => "Request is not valid yet",
            Self::RequestTimeTooSkewed => {
                "The difference between the request time and the server's time is too large."
            }
            Self::SignatureDoesNotMatch => {
                "The request signature we calculated does not match the signature you provided. Check your key and signing method."
            }
            Self::SlowDown => "Resource busy, please reduce your request rate.",
            Self::XAmzContentSHA256Mismatch => {
                "The provided 'x-amz-content-sha256' header does not match what was computed."
            }
        }
    }

    /// Whether a client may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SlowDown | Self::InternalError)
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error returned by every gateway operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The requested bucket name is taken by another owner.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket already exists and is owned by the caller.
    #[error(
        "Your previous request to create the named bucket succeeded and you already own it: {bucket}"
    )]
    BucketAlreadyOwnedByYou {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket still holds objects.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// The access key does not exist or was deleted.
    #[error("The access key does not exist: {key}")]
    NoSuchAccessKey {
        /// The access key that was not found.
        key: String,
    },

    /// The parts of a completion request are not strictly ascending.
    #[error("The list of parts was not in ascending order at part {part_number}")]
    InvalidPartOrder {
        /// The first part number out of order.
        part_number: u32,
    },

    /// A requested part is missing or its ETag does not match.
    #[error("Part {part_number} is invalid: expected ETag {expected:?}, found {actual:?}")]
    InvalidPart {
        /// The offending part number.
        part_number: u32,
        /// The ETag the client sent.
        expected: String,
        /// The ETag on record, empty if the part was never uploaded.
        actual: String,
    },

    /// A part other than the last is below the minimum part size.
    #[error("Part {part_number} is {size} bytes, below the minimum of {min} bytes")]
    PartTooSmall {
        /// The offending part number.
        part_number: u32,
        /// The part's size.
        size: u64,
        /// The configured minimum.
        min: u64,
    },

    /// The body exceeds the maximum object size.
    #[error("Object of {size} bytes exceeds the maximum of {max} bytes")]
    EntityTooLarge {
        /// The declared size.
        size: u64,
        /// The configured maximum.
        max: u64,
    },

    /// The body was shorter or longer than the declared size.
    #[error("Expected {expected} bytes but received {actual}")]
    IncompleteBody {
        /// The declared size.
        expected: u64,
        /// The received size.
        actual: u64,
    },

    /// The specified bucket name is not valid.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        name: String,
        /// The reason for the error.
        reason: String,
    },

    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The XML body is malformed.
    #[error("The XML you provided was not well-formed: {message}")]
    MalformedXml {
        /// Description of the problem.
        message: String,
    },

    /// The declared Content-MD5 is malformed.
    #[error("The Content-MD5 you specified is not valid")]
    InvalidDigest,

    /// The declared Content-MD5 does not match the received body.
    #[error("The Content-MD5 you specified did not match what we received")]
    BadDigest,

    /// The caller may not perform the action.
    #[error("Access Denied")]
    AccessDenied,

    /// A signed body failed chunk signature verification.
    #[error("The request body signature does not match")]
    SignatureDoesNotMatch,

    /// A plain body does not hash to its signed `x-amz-content-sha256`.
    #[error("The provided 'x-amz-content-sha256' header does not match what was computed")]
    ContentSha256Mismatch,

    /// A resource lock could not be acquired in time.
    #[error("Operation timed out waiting for {resource}")]
    OperationTimedOut {
        /// The resource that could not be locked.
        resource: String,
    },

    /// The requested functionality is not implemented.
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// A collaborator store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// The wire-level code for this error.
    #[must_use]
    pub fn code(&self) -> S3ErrorCode {
        match self {
            Self::NoSuchBucket { .. } => S3ErrorCode::NoSuchBucket,
            Self::BucketAlreadyExists { .. } => S3ErrorCode::BucketAlreadyExists,
            Self::BucketAlreadyOwnedByYou { .. } => S3ErrorCode::BucketAlreadyOwnedByYou,
            Self::BucketNotEmpty { .. } => S3ErrorCode::BucketNotEmpty,
            Self::NoSuchKey { .. } => S3ErrorCode::NoSuchKey,
            Self::NoSuchUpload { .. } => S3ErrorCode::NoSuchUpload,
            Self::NoSuchAccessKey { .. } => S3ErrorCode::InvalidAccessKeyId,
            Self::InvalidPartOrder { .. } => S3ErrorCode::InvalidPartOrder,
            Self::InvalidPart { .. } => S3ErrorCode::InvalidPart,
            Self::PartTooSmall { .. } => S3ErrorCode::EntityTooSmall,
            Self::EntityTooLarge { .. } => S3ErrorCode::EntityTooLarge,
            Self::IncompleteBody { .. } => S3ErrorCode::IncompleteBody,
            Self::InvalidBucketName { .. } => S3ErrorCode::InvalidBucketName,
            Self::InvalidArgument { .. } => S3ErrorCode::InvalidArgument,
            Self::MalformedXml { .. } => S3ErrorCode::MalformedXML,
            Self::InvalidDigest => S3ErrorCode::InvalidDigest,
            Self::BadDigest => S3ErrorCode::BadDigest,
            Self::AccessDenied => S3ErrorCode::AccessDenied,
            Self::SignatureDoesNotMatch => S3ErrorCode::SignatureDoesNotMatch,
            Self::ContentSha256Mismatch => S3ErrorCode::XAmzContentSHA256Mismatch,
            Self::OperationTimedOut { .. } => S3ErrorCode::SlowDown,
            Self::NotImplemented(_) => S3ErrorCode::NotImplemented,
            Self::Store(_) | Self::Internal(_) => S3ErrorCode::InternalError,
        }
    }

    /// Classify an error raised while reading a request body.
    ///
    /// Chunk-signature failures become [`ServiceError::SignatureDoesNotMatch`],
    /// payload hash failures [`ServiceError::ContentSha256Mismatch`] and
    /// Content-MD5 mismatches [`ServiceError::BadDigest`]. Anything else is
    /// internal.
    #[must_use]
    pub fn from_body_error(err: io::Error) -> Self {
        if let Some(inner) = err.get_ref() {
            if let Some(auth) = inner.downcast_ref::<casgate_auth::AuthError>() {
                return match auth {
                    casgate_auth::AuthError::ContentSha256Mismatch => Self::ContentSha256Mismatch,
                    _ => Self::SignatureDoesNotMatch,
                };
            }
            if inner.is::<DigestMismatch>() {
                return Self::BadDigest;
            }
        }
        Self::Internal(anyhow::Error::new(err).context("failed to read request body"))
    }
}

impl From<LockError> for ServiceError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::OperationTimedOut { resource } => Self::OperationTimedOut { resource },
        }
    }
}

/// Convenience result type for gateway operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
