//! S3 request routing: virtual hosting resolution and operation identification.
//!
//! The [`S3Router`] maps incoming HTTP requests to S3 operations by examining:
//!
//! - The HTTP method (GET, PUT, DELETE, POST, HEAD)
//! - Whether a bucket name is present (from the Host header or path)
//! - Whether an object key is present (from the URI path)
//! - Query parameters that identify sub-resources (e.g., `?acl`, `?uploads`)
//! - `x-amz-copy-source`, which turns a PutObject into a CopyObject
//!
//! Virtual hosting is supported: the bucket name can come from either the `Host` header
//! (e.g., `mybucket.s3.localhost`) or from the first path segment (path-style).
//!
//! Sub-resources S3 defines but the gateway does not serve (`?versioning`,
//! `?tagging`, `?list-type=2`, ...) route to `NotImplemented` rather than falling
//! through to the plain operation.

use http::Method;
use percent_encoding::percent_decode_str;

use casgate_core::error::S3ErrorCode;

use crate::error::S3Error;
use crate::operation::S3Operation;

/// Bucket sub-resources that exist in S3 but are not served here.
const UNSUPPORTED_BUCKET_SUBRESOURCES: &[&str] = &[
    "accelerate",
    "analytics",
    "cors",
    "delete",
    "encryption",
    "intelligent-tiering",
    "inventory",
    "lifecycle",
    "logging",
    "metrics",
    "notification",
    "object-lock",
    "ownershipControls",
    "policy",
    "policyStatus",
    "publicAccessBlock",
    "replication",
    "requestPayment",
    "tagging",
    "versioning",
    "versions",
    "website",
];

/// Object sub-resources that exist in S3 but are not served here.
const UNSUPPORTED_OBJECT_SUBRESOURCES: &[&str] = &[
    "acl",
    "attributes",
    "legal-hold",
    "restore",
    "retention",
    "select",
    "tagging",
    "torrent",
];

/// Configuration for S3 request routing.
#[derive(Debug, Clone)]
pub struct S3Router {
    /// The base domain for virtual-hosted-style requests (e.g., `s3.localhost`).
    pub domain: String,
    /// Whether to enable virtual-hosted-style bucket addressing.
    pub virtual_hosting: bool,
}

/// The result of routing an HTTP request to an S3 operation.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The resolved bucket name, if any.
    pub bucket: Option<String>,
    /// The resolved object key, if any.
    pub key: Option<String>,
    /// The identified S3 operation.
    pub operation: S3Operation,
    /// Parsed query parameters from the request URI.
    pub query_params: Vec<(String, String)>,
}

impl RoutingContext {
    /// The bucket name, or `InvalidRequest` for a service-level route.
    pub fn bucket(&self) -> Result<&str, S3Error> {
        self.bucket
            .as_deref()
            .ok_or_else(|| S3Error::with_message(S3ErrorCode::InvalidRequest, "Missing bucket"))
    }

    /// The object key, or `InvalidRequest` for a bucket-level route.
    pub fn key(&self) -> Result<&str, S3Error> {
        self.key
            .as_deref()
            .ok_or_else(|| S3Error::with_message(S3ErrorCode::InvalidRequest, "Missing key"))
    }

    /// The `/{bucket}/{key}` path the request addresses, for error documents.
    #[must_use]
    pub fn resource(&self) -> String {
        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => format!("/{bucket}/{key}"),
            (Some(bucket), None) => format!("/{bucket}"),
            _ => "/".to_owned(),
        }
    }
}

impl S3Router {
    /// Create a new router with the given domain and virtual hosting setting.
    #[must_use]
    pub fn new(domain: impl Into<String>, virtual_hosting: bool) -> Self {
        Self {
            domain: domain.into(),
            virtual_hosting,
        }
    }

    /// Resolve an HTTP request to a routing context containing the identified S3 operation.
    ///
    /// This performs:
    /// 1. Virtual hosting resolution (extract bucket from Host header if applicable)
    /// 2. Path parsing (extract bucket and key from URI path)
    /// 3. Query parameter parsing
    /// 4. Operation identification from method + path structure + query params + headers
    ///
    /// # Errors
    ///
    /// Returns an `S3Error` if the request cannot be routed to a served operation.
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
        let method = req.method();
        let uri = req.uri();
        let headers = req.headers();

        let query_params = parse_query_params(uri.query().unwrap_or(""));

        let virtual_bucket = if self.virtual_hosting {
            extract_virtual_host_bucket(headers, &self.domain)
        } else {
            None
        };

        let path = uri.path();
        let (bucket, key) = if let Some(vhost_bucket) = virtual_bucket {
            // Virtual hosting: bucket comes from Host, entire path is the key.
            let raw_key = path.strip_prefix('/').unwrap_or(path);
            let key = (!raw_key.is_empty()).then(|| decode_uri_component(raw_key));
            (Some(vhost_bucket), key)
        } else {
            parse_path(path)
        };

        let operation = identify_operation(
            method,
            bucket.is_some(),
            key.is_some(),
            &query_params,
            headers,
        )?;

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
        })
    }
}

/// Extract the bucket name from a virtual-hosted-style Host header.
///
/// For example, if the domain is `s3.localhost` and the Host header is
/// `mybucket.s3.localhost:9000`, this returns `Some("mybucket")`.
fn extract_virtual_host_bucket(headers: &http::HeaderMap, domain: &str) -> Option<String> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())?;

    let host_without_port = host.split(':').next().unwrap_or(host);

    let bucket = host_without_port.strip_suffix(domain)?.strip_suffix('.')?;
    (!bucket.is_empty()).then(|| bucket.to_owned())
}

/// Parse the URI path into an optional bucket and optional key.
///
/// Path format: `/{bucket}` or `/{bucket}/{key...}`
fn parse_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None);
    }

    match trimmed.split_once('/') {
        Some((bucket, key_raw)) => {
            let key = (!key_raw.is_empty()).then(|| decode_uri_component(key_raw));
            (Some(decode_uri_component(bucket)), key)
        }
        None => (Some(decode_uri_component(trimmed)), None),
    }
}

/// Decode a percent-encoded URI component.
fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into key-value pairs.
///
/// `+` is a space in query strings, as browsers and SDKs encode it.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_query_component(key), decode_query_component(value))
        })
        .collect()
}

fn decode_query_component(s: &str) -> String {
    decode_uri_component(&s.replace('+', " "))
}

/// Whether a query parameter is present.
pub(crate) fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

/// Get the value of a query parameter by name.
pub(crate) fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// The first unsupported sub-resource named in the query, if any.
fn unsupported_subresource<'a>(
    params: &[(String, String)],
    candidates: &[&'a str],
) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|name| query_has_key(params, name))
}

/// Identify the S3 operation from the HTTP method, path structure, query params, and headers.
fn identify_operation(
    method: &Method,
    has_bucket: bool,
    has_key: bool,
    query_params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    match (method, has_bucket, has_key) {
        // No bucket: only ListBuckets is valid.
        (&Method::GET, false, false) => Ok(S3Operation::ListBuckets),

        (method, true, false) => identify_bucket_operation(method, query_params),

        (method, true, true) => identify_object_operation(method, query_params, headers),

        // Invalid: key without bucket should not occur.
        (_, false, true) => Err(S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "Object key specified without bucket",
        )),

        (_, false, false) => Err(S3Error::with_message(
            S3ErrorCode::MethodNotAllowed,
            "Only GET is allowed at the service level",
        )),
    }
}

/// Identify a bucket-level operation (bucket present, no key).
fn identify_bucket_operation(
    method: &Method,
    params: &[(String, String)],
) -> Result<S3Operation, S3Error> {
    if let Some(name) = unsupported_subresource(params, UNSUPPORTED_BUCKET_SUBRESOURCES) {
        return Err(S3Error::not_implemented(format!("Bucket sub-resource ?{name}")));
    }

    match *method {
        Method::GET => identify_bucket_get(params),
        Method::PUT => Ok(if query_has_key(params, "acl") {
            S3Operation::PutBucketAcl
        } else {
            S3Operation::CreateBucket
        }),
        Method::DELETE => Ok(S3Operation::DeleteBucket),
        Method::HEAD => Ok(S3Operation::HeadBucket),
        Method::POST => Err(S3Error::not_implemented("POST on a bucket")),
        _ => Err(S3Error::method_not_allowed(method.as_str())),
    }
}

/// Identify a GET operation on a bucket.
fn identify_bucket_get(params: &[(String, String)]) -> Result<S3Operation, S3Error> {
    if query_has_key(params, "acl") {
        return Ok(S3Operation::GetBucketAcl);
    }
    if query_has_key(params, "location") {
        return Ok(S3Operation::GetBucketLocation);
    }
    if query_has_key(params, "uploads") {
        return Ok(S3Operation::ListMultipartUploads);
    }
    if query_value(params, "list-type") == Some("2") {
        return Err(S3Error::not_implemented("ListObjectsV2"));
    }

    Ok(S3Operation::ListObjects)
}

/// Identify an object-level operation (bucket + key present).
fn identify_object_operation(
    method: &Method,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    if let Some(name) = unsupported_subresource(params, UNSUPPORTED_OBJECT_SUBRESOURCES) {
        return Err(S3Error::not_implemented(format!("Object sub-resource ?{name}")));
    }

    match *method {
        Method::GET => Ok(if query_has_key(params, "uploadId") {
            S3Operation::ListParts
        } else {
            S3Operation::GetObject
        }),
        Method::PUT => identify_object_put(params, headers),
        Method::DELETE => Ok(if query_has_key(params, "uploadId") {
            S3Operation::AbortMultipartUpload
        } else {
            S3Operation::DeleteObject
        }),
        Method::HEAD => Ok(S3Operation::HeadObject),
        Method::POST => identify_object_post(params),
        _ => Err(S3Error::method_not_allowed(method.as_str())),
    }
}

/// Identify a PUT operation on an object.
fn identify_object_put(
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    let has_copy_source = headers.contains_key("x-amz-copy-source");

    if query_has_key(params, "partNumber") && query_has_key(params, "uploadId") {
        if has_copy_source {
            return Err(S3Error::not_implemented("UploadPartCopy"));
        }
        return Ok(S3Operation::UploadPart);
    }

    Ok(if has_copy_source {
        S3Operation::CopyObject
    } else {
        S3Operation::PutObject
    })
}

/// Identify a POST operation on an object.
fn identify_object_post(params: &[(String, String)]) -> Result<S3Operation, S3Error> {
    if query_has_key(params, "uploads") {
        return Ok(S3Operation::CreateMultipartUpload);
    }
    if query_has_key(params, "uploadId") {
        return Ok(S3Operation::CompleteMultipartUpload);
    }

    Err(S3Error::method_not_allowed("POST"))
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn router() -> S3Router {
        S3Router::new("s3.localhost", true)
    }

    fn path_style_router() -> S3Router {
        S3Router::new("s3.localhost", false)
    }

    fn request(method: &Method, uri: &str) -> Request<()> {
        Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("Host", "s3.localhost:9000")
            .body(())
            .expect("valid request")
    }

    fn vhost_request(method: &Method, host: &str, uri: &str) -> Request<()> {
        Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("Host", host)
            .body(())
            .expect("valid request")
    }

    fn route(method: &Method, uri: &str) -> S3Operation {
        path_style_router()
            .resolve(&request(method, uri))
            .expect("should resolve")
            .operation
    }

    // --- Virtual hosting tests ---

    #[test]
    fn test_should_extract_bucket_from_virtual_host() {
        let req = vhost_request(&Method::GET, "mybucket.s3.localhost:9000", "/");
        let ctx = router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.bucket.as_deref(), Some("mybucket"));
        assert!(ctx.key.is_none());
        assert_eq!(ctx.operation, S3Operation::ListObjects);
    }

    #[test]
    fn test_should_extract_bucket_and_key_from_virtual_host() {
        let req = vhost_request(
            &Method::GET,
            "mybucket.s3.localhost:9000",
            "/mykey/sub%20path",
        );
        let ctx = router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.bucket.as_deref(), Some("mybucket"));
        assert_eq!(ctx.key.as_deref(), Some("mykey/sub path"));
        assert_eq!(ctx.operation, S3Operation::GetObject);
        assert_eq!(ctx.resource(), "/mybucket/mykey/sub path");
    }

    #[test]
    fn test_should_ignore_virtual_host_when_disabled() {
        let req = vhost_request(&Method::GET, "mybucket.s3.localhost:9000", "/");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert!(ctx.bucket.is_none());
        assert_eq!(ctx.operation, S3Operation::ListBuckets);
    }

    #[test]
    fn test_should_fall_back_to_path_style_for_bare_domain() {
        let req = vhost_request(&Method::GET, "s3.localhost:9000", "/photos/cat.jpg");
        let ctx = router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.bucket.as_deref(), Some("photos"));
        assert_eq!(ctx.key.as_deref(), Some("cat.jpg"));

        let other = vhost_request(&Method::GET, "photos.example.com", "/cat.jpg");
        let ctx = router().resolve(&other).expect("should resolve");
        assert_eq!(ctx.bucket.as_deref(), Some("cat.jpg"));
        assert!(ctx.key.is_none());
    }

    // --- Bucket-level operation routing ---

    #[test]
    fn test_should_route_bucket_operations() {
        assert_eq!(route(&Method::GET, "/"), S3Operation::ListBuckets);
        assert_eq!(route(&Method::PUT, "/mybucket"), S3Operation::CreateBucket);
        assert_eq!(route(&Method::HEAD, "/mybucket"), S3Operation::HeadBucket);
        assert_eq!(route(&Method::DELETE, "/mybucket"), S3Operation::DeleteBucket);
        assert_eq!(route(&Method::GET, "/mybucket"), S3Operation::ListObjects);
        assert_eq!(
            route(&Method::GET, "/mybucket?prefix=a%2Fb&delimiter=%2F"),
            S3Operation::ListObjects
        );
        assert_eq!(route(&Method::GET, "/mybucket?acl"), S3Operation::GetBucketAcl);
        assert_eq!(route(&Method::PUT, "/mybucket?acl"), S3Operation::PutBucketAcl);
        assert_eq!(
            route(&Method::GET, "/mybucket?location"),
            S3Operation::GetBucketLocation
        );
        assert_eq!(
            route(&Method::GET, "/mybucket?uploads"),
            S3Operation::ListMultipartUploads
        );
    }

    #[test]
    fn test_should_reject_unsupported_bucket_subresources() {
        for uri in [
            "/mybucket?versioning",
            "/mybucket?tagging",
            "/mybucket?list-type=2",
            "/mybucket?policy",
        ] {
            let err = path_style_router()
                .resolve(&request(&Method::GET, uri))
                .expect_err("should not route");
            assert_eq!(err.code, S3ErrorCode::NotImplemented, "{uri}");
        }

        let err = path_style_router()
            .resolve(&request(&Method::POST, "/mybucket?delete"))
            .expect_err("should not route");
        assert_eq!(err.code, S3ErrorCode::NotImplemented);
    }

    #[test]
    fn test_should_reject_non_get_at_service_level() {
        let err = path_style_router()
            .resolve(&request(&Method::PUT, "/"))
            .expect_err("should not route");
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
    }

    // --- Object-level operation routing ---

    #[test]
    fn test_should_route_object_operations() {
        assert_eq!(route(&Method::PUT, "/mybucket/mykey"), S3Operation::PutObject);
        assert_eq!(route(&Method::GET, "/mybucket/my/key"), S3Operation::GetObject);
        assert_eq!(route(&Method::HEAD, "/mybucket/mykey"), S3Operation::HeadObject);
        assert_eq!(
            route(&Method::DELETE, "/mybucket/mykey"),
            S3Operation::DeleteObject
        );
    }

    #[test]
    fn test_should_route_copy_object() {
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/mybucket/mykey")
            .header("x-amz-copy-source", "/srcbucket/srckey")
            .body(())
            .expect("valid request");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.operation, S3Operation::CopyObject);
    }

    #[test]
    fn test_should_route_multipart_operations() {
        assert_eq!(
            route(&Method::POST, "/mybucket/mykey?uploads"),
            S3Operation::CreateMultipartUpload
        );
        assert_eq!(
            route(&Method::PUT, "/mybucket/mykey?partNumber=1&uploadId=abc"),
            S3Operation::UploadPart
        );
        assert_eq!(
            route(&Method::GET, "/mybucket/mykey?uploadId=abc"),
            S3Operation::ListParts
        );
        assert_eq!(
            route(&Method::POST, "/mybucket/mykey?uploadId=abc"),
            S3Operation::CompleteMultipartUpload
        );
        assert_eq!(
            route(&Method::DELETE, "/mybucket/mykey?uploadId=abc"),
            S3Operation::AbortMultipartUpload
        );
    }

    #[test]
    fn test_should_reject_unsupported_object_requests() {
        let err = path_style_router()
            .resolve(&request(&Method::GET, "/mybucket/mykey?tagging"))
            .expect_err("should not route");
        assert_eq!(err.code, S3ErrorCode::NotImplemented);

        let err = path_style_router()
            .resolve(&request(&Method::POST, "/mybucket/mykey"))
            .expect_err("should not route");
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);

        let err = path_style_router()
            .resolve(&request(&Method::PATCH, "/mybucket/mykey"))
            .expect_err("should not route");
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
    }

    // --- Parsing helpers ---

    #[test]
    fn test_should_parse_query_params() {
        let params = parse_query_params("uploads&prefix=a%2Fb&marker=x+y&max-keys=10");
        assert!(query_has_key(&params, "uploads"));
        assert_eq!(query_value(&params, "uploads"), Some(""));
        assert_eq!(query_value(&params, "prefix"), Some("a/b"));
        assert_eq!(query_value(&params, "marker"), Some("x y"));
        assert_eq!(query_value(&params, "max-keys"), Some("10"));
        assert!(parse_query_params("").is_empty());
    }

    #[test]
    fn test_should_parse_paths() {
        assert_eq!(parse_path("/"), (None, None));
        assert_eq!(parse_path("/bucket"), (Some("bucket".to_owned()), None));
        assert_eq!(parse_path("/bucket/"), (Some("bucket".to_owned()), None));
        assert_eq!(
            parse_path("/bucket/a/b%2Bc"),
            (Some("bucket".to_owned()), Some("a/b+c".to_owned()))
        );
    }
}
