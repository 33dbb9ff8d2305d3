//! Gateway outputs to HTTP responses.
//!
//! Response categories:
//! - **Header-only**: writes and `HEAD`s that report object metadata in headers.
//! - **XML body**: listings, ACLs, locations and multipart documents.
//! - **Streaming body**: `GetObject` passes the blob content through.

use chrono::{DateTime, Utc};
use http::header::HeaderValue;

use casgate_core::state::ObjectRecord;
use casgate_xml::{S3Serialize, to_xml};

use crate::body::S3ResponseBody;
use crate::error::S3Error;

/// HTTP date format of `Last-Modified`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Set an optional header on a response builder if the value is `Some`.
pub fn set_optional_header(
    builder: http::response::Builder,
    name: &str,
    value: Option<&str>,
) -> http::response::Builder {
    if let Some(v) = value {
        if let Ok(hv) = HeaderValue::from_str(v) {
            return builder.header(name, hv);
        }
    }
    builder
}

/// Set an HTTP date header from a `DateTime<Utc>`.
pub fn set_timestamp_header(
    builder: http::response::Builder,
    name: &str,
    value: &DateTime<Utc>,
) -> http::response::Builder {
    builder.header(name, format_http_date(value))
}

/// Format a timestamp as an HTTP date.
#[must_use]
pub fn format_http_date(value: &DateTime<Utc>) -> String {
    value.format(HTTP_DATE_FORMAT).to_string()
}

/// Set `x-amz-meta-*` headers from user metadata.
pub fn set_metadata_headers<'a>(
    mut builder: http::response::Builder,
    metadata: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> http::response::Builder {
    for (key, value) in metadata {
        let header_name = format!("x-amz-meta-{key}");
        if let Ok(hv) = HeaderValue::from_str(value) {
            builder = builder.header(header_name, hv);
        }
    }
    builder
}

/// Wrap an unquoted ETag in the quotes S3 sends on the wire.
#[must_use]
pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Build a response from a builder, converting build errors to `S3Error`.
pub fn build_response(
    builder: http::response::Builder,
    body: S3ResponseBody,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    builder
        .body(body)
        .map_err(|e| S3Error::internal_error(format!("failed to build HTTP response: {e}")))
}

/// A `200 OK` response carrying an XML document.
pub fn xml_response<T: S3Serialize>(value: &T) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let xml = to_xml(value)
        .map_err(|e| S3Error::internal_error(format!("failed to serialize XML: {e}")))?;
    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/xml"),
        S3ResponseBody::from_xml(xml),
    )
}

/// A bodiless response with `status`.
pub fn empty_response(
    status: http::StatusCode,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    build_response(
        http::Response::builder().status(status),
        S3ResponseBody::empty(),
    )
}

/// A response builder with the headers describing `record`.
///
/// Sets `ETag`, `Last-Modified`, `Content-Type`, `Content-Length` and, when
/// present, `Content-Encoding`, `Expires` and `x-amz-meta-*`.
#[must_use]
pub fn object_headers(record: &ObjectRecord) -> http::response::Builder {
    let builder = http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::ETAG, quote_etag(&record.etag))
        .header(http::header::CONTENT_LENGTH, record.size)
        .header(http::header::ACCEPT_RANGES, "bytes");
    let builder = set_timestamp_header(builder, "Last-Modified", &record.mod_time);
    let builder = set_optional_header(
        builder,
        "Content-Type",
        Some(record.content_type_or_default()),
    );
    let builder = set_optional_header(
        builder,
        "Content-Encoding",
        record.content_encoding.as_deref(),
    );
    let builder = set_optional_header(builder, "Expires", record.expires.as_deref());
    set_metadata_headers(builder, &record.user_metadata)
}
