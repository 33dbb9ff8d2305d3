//! [`S3Handler`] implementation over the [`CasGateway`].
//!
//! Each operation reads its inputs with the [`crate::request`] helpers, calls
//! the matching gateway method and renders the result with the
//! [`crate::response`] helpers.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use casgate_core::CasGateway;
use casgate_core::error::{S3ErrorCode, ServiceError};
use casgate_core::ops::list::MAX_KEYS;
use casgate_core::state::{BucketRecord, CompletedPart, MultipartRecord, ObjectRecord};
use casgate_core::utils::parse_copy_source;
use casgate_xml::types::{
    AccessControlPolicy, BucketEntry, CompleteMultipartUpload, CompleteMultipartUploadResult,
    CopyObjectResult, CreateBucketConfiguration, InitiateMultipartUploadResult,
    ListAllMyBucketsResult, ListBucketResult, ListMultipartUploadsResult, ListPartsResult,
    LocationConstraint, ObjectEntry, Owner, PartEntry, UploadEntry,
};

use crate::body::{CollectError, S3ResponseBody, collect_limited};
use crate::dispatch::{HandlerFuture, S3Handler, S3Request};
use crate::error::S3Error;
use crate::operation::S3Operation;
use crate::request::{
    canned_acl, header_str, list_objects_query, metadata_directive, object_meta, parse_xml_body,
    part_number, payload, require_query_param,
};
use crate::response::{
    build_response, empty_response, object_headers, quote_etag, xml_response,
};
use crate::router::RoutingContext;

/// Largest XML request document accepted.
const MAX_XML_BODY_SIZE: u64 = 1024 * 1024;

/// Number of parts and uploads a single listing reports.
const MAX_LISTED: u32 = 1000;

type HandlerResult = Result<http::Response<S3ResponseBody>, S3Error>;

/// Serves S3 operations from a [`CasGateway`].
#[derive(Debug, Clone)]
pub struct GatewayHandler {
    gateway: Arc<CasGateway>,
}

impl GatewayHandler {
    /// Create a handler over a shared gateway.
    #[must_use]
    pub fn new(gateway: Arc<CasGateway>) -> Self {
        Self { gateway }
    }

    /// The gateway behind this handler.
    #[must_use]
    pub fn gateway(&self) -> &Arc<CasGateway> {
        &self.gateway
    }
}

impl S3Handler for GatewayHandler {
    fn handle_operation(
        &self,
        op: S3Operation,
        req: S3Request,
        ctx: RoutingContext,
    ) -> HandlerFuture {
        let gateway = Arc::clone(&self.gateway);
        Box::pin(async move { handle(&gateway, op, req, &ctx).await })
    }
}

async fn handle(
    gw: &CasGateway,
    op: S3Operation,
    req: S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    match op {
        S3Operation::ListBuckets => list_buckets(gw, &req).await,
        S3Operation::CreateBucket => create_bucket(gw, req, ctx).await,
        S3Operation::HeadBucket => head_bucket(gw, &req, ctx).await,
        S3Operation::DeleteBucket => delete_bucket(gw, &req, ctx).await,
        S3Operation::ListObjects => list_objects(gw, &req, ctx).await,
        S3Operation::GetBucketAcl => get_bucket_acl(gw, &req, ctx).await,
        S3Operation::PutBucketAcl => put_bucket_acl(gw, req, ctx).await,
        S3Operation::GetBucketLocation => get_bucket_location(gw, &req, ctx).await,
        S3Operation::ListMultipartUploads => list_multipart_uploads(gw, &req, ctx).await,
        S3Operation::PutObject => put_object(gw, req, ctx).await,
        S3Operation::CopyObject => copy_object(gw, &req, ctx).await,
        S3Operation::GetObject => get_object(gw, &req, ctx).await,
        S3Operation::HeadObject => head_object(gw, &req, ctx).await,
        S3Operation::DeleteObject => delete_object(gw, &req, ctx).await,
        S3Operation::CreateMultipartUpload => create_multipart_upload(gw, &req, ctx).await,
        S3Operation::UploadPart => upload_part(gw, req, ctx).await,
        S3Operation::ListParts => list_parts(gw, &req, ctx).await,
        S3Operation::CompleteMultipartUpload => complete_multipart_upload(gw, req, ctx).await,
        S3Operation::AbortMultipartUpload => abort_multipart_upload(gw, &req, ctx).await,
    }
}

/// Read a small request document, or `None` for an empty body.
async fn read_small_body(req: S3Request) -> Result<Option<Bytes>, S3Error> {
    let body = collect_limited(req.body, MAX_XML_BODY_SIZE)
        .await
        .map_err(|e| match e {
            CollectError::TooLarge { .. } => S3Error::with_message(
                S3ErrorCode::MalformedXML,
                "The XML document exceeds the maximum allowed size",
            ),
            CollectError::Io(e) => S3Error::from(ServiceError::from_body_error(e)),
        })?;
    Ok((!body.is_empty()).then_some(body))
}

fn object_entry(record: &ObjectRecord, owner: &Owner) -> ObjectEntry {
    ObjectEntry {
        key: record.name.clone(),
        last_modified: record.mod_time,
        etag: quote_etag(&record.etag),
        size: record.size,
        owner: owner.clone(),
    }
}

fn bucket_policy(record: &BucketRecord) -> AccessControlPolicy {
    AccessControlPolicy::canned(
        Owner::new(&record.owner),
        record.acl.is_public_read(),
        record.acl == casgate_core::acl::Acl::PublicReadWrite,
    )
}

// ---------------------------------------------------------------------------
// Bucket operations
// ---------------------------------------------------------------------------

async fn list_buckets(gw: &CasGateway, req: &S3Request) -> HandlerResult {
    let buckets = gw.list_buckets_of_user(&req.principal).await?;
    xml_response(&ListAllMyBucketsResult {
        owner: Owner::new(req.principal.access_key().unwrap_or_default()),
        buckets: buckets
            .into_iter()
            .map(|b| BucketEntry {
                name: b.name,
                creation_date: b.created,
            })
            .collect(),
    })
}

async fn create_bucket(gw: &CasGateway, req: S3Request, ctx: &RoutingContext) -> HandlerResult {
    let bucket = ctx.bucket()?;
    let acl = canned_acl(&req.parts)?;
    let principal = req.principal.clone();

    let region = match read_small_body(req).await? {
        Some(body) => parse_xml_body::<CreateBucketConfiguration>(&body)?.location_constraint,
        None => None,
    };
    let region = region.filter(|r| !r.is_empty());

    let record = gw
        .create_bucket(&principal, bucket, region.as_deref(), acl)
        .await?;
    debug!(bucket = %record.name, region = %record.region, "bucket created");

    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::LOCATION, format!("/{bucket}")),
        S3ResponseBody::empty(),
    )
}

async fn head_bucket(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let record = gw.get_bucket(&req.principal, ctx.bucket()?).await?;
    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header("x-amz-bucket-region", record.region),
        S3ResponseBody::empty(),
    )
}

async fn delete_bucket(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    gw.delete_bucket(&req.principal, ctx.bucket()?).await?;
    empty_response(http::StatusCode::NO_CONTENT)
}

async fn list_objects(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let bucket = ctx.bucket()?;
    let query = list_objects_query(&ctx.query_params)?;
    let listing = gw.list_objects(&req.principal, bucket, &query).await?;
    let owner = Owner::new(gw.get_bucket(&req.principal, bucket).await?.owner);

    xml_response(&ListBucketResult {
        name: bucket.to_owned(),
        prefix: query.prefix.clone(),
        marker: query.marker.clone().unwrap_or_default(),
        next_marker: listing.next_marker,
        max_keys: query.max_keys.map_or(MAX_KEYS, |n| n.min(MAX_KEYS)),
        delimiter: query.delimiter.clone(),
        is_truncated: listing.is_truncated,
        contents: listing
            .objects
            .iter()
            .map(|record| object_entry(record, &owner))
            .collect(),
        common_prefixes: listing.common_prefixes,
    })
}

async fn get_bucket_acl(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let record = gw.get_bucket_acl(&req.principal, ctx.bucket()?).await?;
    xml_response(&bucket_policy(&record))
}

async fn put_bucket_acl(gw: &CasGateway, req: S3Request, ctx: &RoutingContext) -> HandlerResult {
    let bucket = ctx.bucket()?;
    let has_canned = req.parts.headers.contains_key("x-amz-acl");
    let acl = canned_acl(&req.parts)?;
    let principal = req.principal.clone();

    if !has_canned && read_small_body(req).await?.is_some() {
        return Err(S3Error::not_implemented("Access control policy documents"));
    }

    gw.put_bucket_acl(&principal, bucket, acl).await?;
    empty_response(http::StatusCode::OK)
}

async fn get_bucket_location(
    gw: &CasGateway,
    req: &S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    let region = gw.get_bucket_location(&req.principal, ctx.bucket()?).await?;
    xml_response(&LocationConstraint { region })
}

fn upload_entry(upload: &MultipartRecord) -> UploadEntry {
    let initiator = Owner::new(&upload.initiator);
    UploadEntry {
        key: upload.object.clone(),
        upload_id: upload.upload_id.clone(),
        owner: initiator.clone(),
        initiator,
        initiated: upload.initiated,
    }
}

async fn list_multipart_uploads(
    gw: &CasGateway,
    req: &S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    let bucket = ctx.bucket()?;
    let uploads = gw.list_multipart_uploads(&req.principal, bucket).await?;
    xml_response(&ListMultipartUploadsResult {
        bucket: bucket.to_owned(),
        max_uploads: MAX_LISTED,
        is_truncated: false,
        uploads: uploads.iter().map(upload_entry).collect(),
    })
}

// ---------------------------------------------------------------------------
// Object operations
// ---------------------------------------------------------------------------

async fn put_object(gw: &CasGateway, req: S3Request, ctx: &RoutingContext) -> HandlerResult {
    let meta = object_meta(&req.parts)?;
    let payload = payload(&req.parts, req.body, req.chunked)?;
    let record = gw
        .put_object(&req.principal, ctx.bucket()?, ctx.key()?, payload, meta)
        .await?;
    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::ETAG, quote_etag(&record.etag)),
        S3ResponseBody::empty(),
    )
}

async fn copy_object(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let source = header_str(&req.parts, "x-amz-copy-source").ok_or_else(|| {
        S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "x-amz-copy-source header is required for CopyObject",
        )
    })?;
    let (src_bucket, src_key) = parse_copy_source(&source)?;
    let directive = metadata_directive(&req.parts)?;
    let meta = object_meta(&req.parts)?;

    let record = gw
        .copy_object(
            &req.principal,
            &src_bucket,
            &src_key,
            ctx.bucket()?,
            ctx.key()?,
            directive,
            meta,
        )
        .await?;
    xml_response(&CopyObjectResult {
        etag: quote_etag(&record.etag),
        last_modified: record.mod_time,
    })
}

async fn get_object(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let output = gw
        .get_object(&req.principal, ctx.bucket()?, ctx.key()?)
        .await?;
    let size = output.record.size;
    build_response(
        object_headers(&output.record),
        S3ResponseBody::from_stream(output.body, Some(size)),
    )
}

async fn head_object(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let record = gw
        .head_object(&req.principal, ctx.bucket()?, ctx.key()?)
        .await?;
    build_response(object_headers(&record), S3ResponseBody::empty())
}

async fn delete_object(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    gw.delete_object(&req.principal, ctx.bucket()?, ctx.key()?)
        .await?;
    empty_response(http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Multipart operations
// ---------------------------------------------------------------------------

async fn create_multipart_upload(
    gw: &CasGateway,
    req: &S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    let meta = object_meta(&req.parts)?;
    let upload = gw
        .create_multipart_upload(&req.principal, ctx.bucket()?, ctx.key()?, meta)
        .await?;
    xml_response(&InitiateMultipartUploadResult {
        bucket: upload.bucket,
        key: upload.object,
        upload_id: upload.upload_id,
    })
}

async fn upload_part(gw: &CasGateway, req: S3Request, ctx: &RoutingContext) -> HandlerResult {
    let upload_id = require_query_param(&ctx.query_params, "uploadId")?;
    let number = part_number(&ctx.query_params)?;
    let payload = payload(&req.parts, req.body, req.chunked)?;
    let part = gw
        .upload_part(
            &req.principal,
            ctx.bucket()?,
            ctx.key()?,
            &upload_id,
            number,
            payload,
        )
        .await?;
    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::ETAG, quote_etag(&part.etag)),
        S3ResponseBody::empty(),
    )
}

async fn list_parts(gw: &CasGateway, req: &S3Request, ctx: &RoutingContext) -> HandlerResult {
    let upload_id = require_query_param(&ctx.query_params, "uploadId")?;
    let upload = gw
        .list_parts(&req.principal, ctx.bucket()?, ctx.key()?, &upload_id)
        .await?;
    let initiator = Owner::new(&upload.initiator);
    xml_response(&ListPartsResult {
        parts: upload
            .parts()
            .map(|part| PartEntry {
                part_number: part.number,
                last_modified: part.mod_time,
                etag: quote_etag(&part.etag),
                size: part.size,
            })
            .collect(),
        bucket: upload.bucket,
        key: upload.object,
        upload_id: upload.upload_id,
        owner: initiator.clone(),
        initiator,
        max_parts: MAX_LISTED,
        is_truncated: false,
    })
}

async fn complete_multipart_upload(
    gw: &CasGateway,
    req: S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    let bucket = ctx.bucket()?;
    let key = ctx.key()?;
    let upload_id = require_query_param(&ctx.query_params, "uploadId")?;
    let principal = req.principal.clone();

    let body = read_small_body(req).await?.unwrap_or_default();
    let document: CompleteMultipartUpload = parse_xml_body(&body)?;
    let parts: Vec<CompletedPart> = document
        .parts
        .into_iter()
        .map(|p| CompletedPart {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();

    let record = gw
        .complete_multipart_upload(&principal, bucket, key, &upload_id, &parts)
        .await?;
    xml_response(&CompleteMultipartUploadResult {
        location: format!("/{bucket}/{key}"),
        bucket: record.bucket,
        key: record.name,
        etag: quote_etag(&record.etag),
    })
}

async fn abort_multipart_upload(
    gw: &CasGateway,
    req: &S3Request,
    ctx: &RoutingContext,
) -> HandlerResult {
    let upload_id = require_query_param(&ctx.query_params, "uploadId")?;
    gw.abort_multipart_upload(&req.principal, ctx.bucket()?, ctx.key()?, &upload_id)
        .await?;
    empty_response(http::StatusCode::NO_CONTENT)
}
