//! The HTTP-facing S3 error.
//!
//! [`S3Error`] is what the HTTP layer renders as an `<Error>` document. Domain
//! errors from the gateway ([`ServiceError`]) and authentication failures
//! ([`AuthError`]) both convert into it.

use bytes::Bytes;
use casgate_auth::AuthError;
use casgate_core::error::{S3ErrorCode, ServiceError};
use casgate_xml::types::ErrorDocument;

use crate::body::S3ResponseBody;

/// An S3 error with its wire code, message and status.
#[derive(Debug, thiserror::Error)]
#[error("S3Error({code}): {message}")]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource that caused the error.
    pub resource: Option<String>,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
}

impl S3Error {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
            status_code: code.default_status_code(),
        }
    }

    /// Attach the resource the error applies to.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// `MethodNotAllowed` for `method`.
    #[must_use]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::with_message(
            S3ErrorCode::MethodNotAllowed,
            format!(
                "The specified method is not allowed against this resource: {}",
                method.into()
            ),
        )
    }

    /// `NotImplemented` for the named functionality.
    #[must_use]
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::with_message(
            S3ErrorCode::NotImplemented,
            format!("{} is not implemented", what.into()),
        )
    }

    /// `InvalidArgument` with a message.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidArgument, message)
    }

    /// `InternalError` with a message.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InternalError, message)
    }
}

impl From<ServiceError> for S3Error {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        // Internal details stay in the logs.
        let message = match code {
            S3ErrorCode::InternalError => code.default_message().to_owned(),
            _ => err.to_string(),
        };
        Self::with_message(code, message)
    }
}

impl From<AuthError> for S3Error {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::AccessKeyNotFound(_) => S3ErrorCode::InvalidAccessKeyId,
            AuthError::SignatureDoesNotMatch | AuthError::MalformedChunk(_) => {
                S3ErrorCode::SignatureDoesNotMatch
            }
            AuthError::RequestExpired | AuthError::ExpiresTooLarge(_) => {
                S3ErrorCode::ExpiredPresignRequest
            }
            AuthError::RequestNotReadyYet => S3ErrorCode::RequestNotReadyYet,
            AuthError::RequestTimeTooSkewed => S3ErrorCode::RequestTimeTooSkewed,
            AuthError::ContentSha256Mismatch => S3ErrorCode::XAmzContentSHA256Mismatch,
            AuthError::UnsupportedAuthType(_) => S3ErrorCode::NotImplemented,
            AuthError::Lookup(_) => S3ErrorCode::InternalError,
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::MissingHeader(_)
            | AuthError::InvalidCredential
            | AuthError::InvalidService(_)
            | AuthError::CredentialDateMismatch
            | AuthError::InvalidDate(_)
            | AuthError::AccessKeyDisabled(_)
            | AuthError::MissingQueryParam(_)
            | AuthError::UnknownAuthType => S3ErrorCode::AccessDenied,
        };
        let message = match code {
            S3ErrorCode::InternalError => code.default_message().to_owned(),
            _ => err.to_string(),
        };
        Self::with_message(code, message)
    }
}

/// Render an error as an `<Error>` response.
///
/// `request_id` is echoed in the document; the caller sets the matching header.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<S3ResponseBody> {
    let xml = casgate_xml::error_to_xml(&ErrorDocument {
        code: err.code.as_str().to_owned(),
        message: err.message.clone(),
        resource: err.resource.clone(),
        request_id: request_id.to_owned(),
    });

    let mut response = http::Response::new(S3ResponseBody::from_bytes(Bytes::from(xml)));
    *response.status_mut() = err.status_code;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/xml"),
    );
    response
}
