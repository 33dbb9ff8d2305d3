//! Extraction of typed gateway inputs from HTTP request parts.
//!
//! Headers and query parameters are read here and turned into the values the
//! gateway operations take: canned ACLs, [`ObjectMeta`], [`Payload`]s, listing
//! queries and parsed XML bodies. Malformed values become `InvalidArgument` or
//! `MalformedXML` errors before any operation runs.

use std::collections::BTreeMap;
use std::str::FromStr;

use casgate_core::ListObjectsQuery;
use casgate_core::acl::Acl;
use casgate_core::error::S3ErrorCode;
use casgate_core::state::{MetadataDirective, ObjectMeta};
use casgate_core::store::{ByteStream, Payload};
use casgate_xml::{S3Deserialize, from_xml};

use crate::error::S3Error;

/// Prefix of user metadata headers.
const USER_METADATA_PREFIX: &str = "x-amz-meta-";

/// Extract a header value as a string.
pub fn header_str(parts: &http::request::Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

/// Extract a header value and parse it into a type implementing `FromStr`.
///
/// Absent headers are `Ok(None)`; present but unparsable ones are
/// `InvalidArgument`.
pub fn header_parse<T: FromStr>(
    parts: &http::request::Parts,
    name: &str,
) -> Result<Option<T>, S3Error> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| S3Error::invalid_argument(format!("Invalid value for header {name}")))
}

/// Get a query parameter value by name.
#[must_use]
pub fn query_param(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Get a query parameter and parse it, rejecting unparsable values.
pub fn query_param_parse<T: FromStr>(
    params: &[(String, String)],
    name: &str,
) -> Result<Option<T>, S3Error> {
    match params.iter().find(|(k, _)| k == name) {
        None => Ok(None),
        Some((_, v)) => v.parse().map(Some).map_err(|_| {
            S3Error::invalid_argument(format!("Invalid value for query parameter {name}"))
        }),
    }
}

/// Require a query parameter, returning `InvalidRequest` if absent.
pub fn require_query_param(params: &[(String, String)], name: &str) -> Result<String, S3Error> {
    query_param(params, name).ok_or_else(|| {
        S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            format!("{name} query parameter is required"),
        )
    })
}

/// Collect all `x-amz-meta-*` headers into a metadata map.
///
/// The key is the portion of the header name after `x-amz-meta-`. Header names
/// arrive lowercased from hyper.
pub fn collect_metadata(parts: &http::request::Parts) -> BTreeMap<String, String> {
    parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            let meta_key = name.as_str().strip_prefix(USER_METADATA_PREFIX)?;
            let meta_value = value.to_str().ok()?;
            Some((meta_key.to_owned(), meta_value.to_owned()))
        })
        .collect()
}

/// The canned ACL from `x-amz-acl`, defaulting to `private`.
pub fn canned_acl(parts: &http::request::Parts) -> Result<Acl, S3Error> {
    match header_str(parts, "x-amz-acl") {
        None => Ok(Acl::default()),
        Some(value) => value.parse::<Acl>().map_err(S3Error::from),
    }
}

/// Header metadata for a new object: ACL, content headers and user metadata.
pub fn object_meta(parts: &http::request::Parts) -> Result<ObjectMeta, S3Error> {
    Ok(ObjectMeta {
        acl: canned_acl(parts)?,
        content_type: header_str(parts, "content-type"),
        content_encoding: header_str(parts, "content-encoding"),
        expires: header_str(parts, "expires"),
        user_metadata: collect_metadata(parts),
    })
}

/// `x-amz-metadata-directive`, defaulting to `COPY`.
pub fn metadata_directive(parts: &http::request::Parts) -> Result<MetadataDirective, S3Error> {
    match header_str(parts, "x-amz-metadata-directive") {
        None => Ok(MetadataDirective::default()),
        Some(value) => value.parse().map_err(S3Error::from),
    }
}

/// The length of the content a body carries.
///
/// `aws-chunked` bodies declare it in `x-amz-decoded-content-length`, since
/// their `Content-Length` includes the chunk framing.
pub fn content_length(
    parts: &http::request::Parts,
    streaming: bool,
) -> Result<Option<u64>, S3Error> {
    if streaming {
        if let Some(length) = header_parse(parts, "x-amz-decoded-content-length")? {
            return Ok(Some(length));
        }
    }
    header_parse(parts, "content-length")
}

/// Wrap a body stream with the size and digest the request declared.
pub fn payload(
    parts: &http::request::Parts,
    stream: ByteStream,
    streaming: bool,
) -> Result<Payload, S3Error> {
    let mut payload = Payload::new(stream);
    if let Some(size) = content_length(parts, streaming)? {
        payload = payload.with_size(size);
    }
    if let Some(md5) = header_str(parts, "content-md5") {
        payload = payload.with_content_md5(md5);
    }
    Ok(payload)
}

/// The `ListObjects` parameters: `prefix`, `delimiter`, `marker`, `max-keys`.
pub fn list_objects_query(params: &[(String, String)]) -> Result<ListObjectsQuery, S3Error> {
    let max_keys = match query_param_parse::<i64>(params, "max-keys")? {
        Some(n) if n < 0 => {
            return Err(S3Error::invalid_argument(
                "max-keys must be a non-negative integer",
            ));
        }
        Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        None => None,
    };

    Ok(ListObjectsQuery {
        prefix: query_param(params, "prefix").unwrap_or_default(),
        delimiter: query_param(params, "delimiter").filter(|d| !d.is_empty()),
        marker: query_param(params, "marker").filter(|m| !m.is_empty()),
        max_keys,
    })
}

/// The `partNumber` query parameter of an `UploadPart`.
pub fn part_number(params: &[(String, String)]) -> Result<u32, S3Error> {
    query_param_parse(params, "partNumber")?.ok_or_else(|| {
        S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "partNumber query parameter is required",
        )
    })
}

/// Parse an XML body into a typed value, returning `MalformedXML` on failure.
pub fn parse_xml_body<T: S3Deserialize>(body: &[u8]) -> Result<T, S3Error> {
    from_xml(body).map_err(|e| {
        S3Error::with_message(
            S3ErrorCode::MalformedXML,
            format!("Failed to parse XML body: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> http::request::Parts {
        let mut builder = Request::builder().uri("/bucket/key");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).expect("valid request").into_parts().0
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_should_build_object_meta_from_headers() {
        let p = parts(&[
            ("Content-Type", "image/png"),
            ("Content-Encoding", "gzip"),
            ("Expires", "Thu, 01 Dec 2044 16:00:00 GMT"),
            ("x-amz-acl", "public-read"),
            ("X-Amz-Meta-Color", "blue"),
            ("x-amz-meta-shape", "round"),
        ]);
        let meta = object_meta(&p).expect("meta");
        assert_eq!(meta.acl, Acl::PublicRead);
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));
        assert_eq!(meta.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(
            meta.expires.as_deref(),
            Some("Thu, 01 Dec 2044 16:00:00 GMT")
        );
        assert_eq!(meta.user_metadata.len(), 2);
        assert_eq!(meta.user_metadata["color"], "blue");
        assert_eq!(meta.user_metadata["shape"], "round");
    }

    #[test]
    fn test_should_default_and_reject_canned_acl() {
        assert_eq!(canned_acl(&parts(&[])).expect("acl"), Acl::Private);
        let err = canned_acl(&parts(&[("x-amz-acl", "authenticated-read")]))
            .expect_err("unsupported acl");
        assert_eq!(err.code, S3ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_should_parse_metadata_directive() {
        assert_eq!(
            metadata_directive(&parts(&[])).expect("directive"),
            MetadataDirective::Copy
        );
        assert_eq!(
            metadata_directive(&parts(&[("x-amz-metadata-directive", "REPLACE")]))
                .expect("directive"),
            MetadataDirective::Replace
        );
        assert!(metadata_directive(&parts(&[("x-amz-metadata-directive", "MOVE")])).is_err());
    }

    #[test]
    fn test_should_prefer_decoded_length_for_streaming_bodies() {
        let p = parts(&[
            ("Content-Length", "1200"),
            ("x-amz-decoded-content-length", "1024"),
        ]);
        assert_eq!(content_length(&p, true).expect("length"), Some(1024));
        assert_eq!(content_length(&p, false).expect("length"), Some(1200));

        let bad = parts(&[("Content-Length", "lots")]);
        assert!(content_length(&bad, false).is_err());
    }

    #[test]
    fn test_should_parse_list_objects_query() {
        let query = list_objects_query(&params(&[
            ("prefix", "photos/"),
            ("delimiter", "/"),
            ("marker", "photos/a.jpg"),
            ("max-keys", "2"),
        ]))
        .expect("query");
        assert_eq!(query.prefix, "photos/");
        assert_eq!(query.delimiter.as_deref(), Some("/"));
        assert_eq!(query.marker.as_deref(), Some("photos/a.jpg"));
        assert_eq!(query.max_keys, Some(2));

        let empty = list_objects_query(&params(&[("delimiter", "")])).expect("query");
        assert_eq!(empty, ListObjectsQuery::default());
    }

    #[test]
    fn test_should_reject_invalid_max_keys() {
        for value in ["-1", "ten"] {
            let err = list_objects_query(&params(&[("max-keys", value)]))
                .expect_err("invalid max-keys");
            assert_eq!(err.code, S3ErrorCode::InvalidArgument);
        }
    }

    #[test]
    fn test_should_require_part_number() {
        assert_eq!(
            part_number(&params(&[("partNumber", "3")])).expect("part"),
            3
        );
        assert_eq!(
            part_number(&params(&[])).expect_err("missing").code,
            S3ErrorCode::InvalidRequest
        );
        assert_eq!(
            part_number(&params(&[("partNumber", "x")]))
                .expect_err("invalid")
                .code,
            S3ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_should_report_malformed_xml() {
        let err = parse_xml_body::<casgate_xml::types::CompleteMultipartUpload>(b"<Complete")
            .expect_err("malformed");
        assert_eq!(err.code, S3ErrorCode::MalformedXML);
    }
}
