//! Wire-level S3 documents.
//!
//! These mirror the XML shapes one to one; the HTTP layer fills them from the
//! gateway's records. Fields that S3 marks optional and casgate always knows
//! are plain values.

use chrono::{DateTime, Utc};

/// Storage class reported for every object, part and upload.
pub const STORAGE_CLASS_STANDARD: &str = "STANDARD";

/// URI of the `AllUsers` grantee group.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// `<Owner>` / `<Initiator>` identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    /// Canonical id; casgate uses the access key.
    pub id: String,
    /// Display name; casgate uses the access key.
    pub display_name: String,
}

impl Owner {
    /// An owner whose id and display name are both `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }
}

/// One `<Bucket>` of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
}

/// `ListAllMyBucketsResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListAllMyBucketsResult {
    /// The caller.
    pub owner: Owner,
    /// The caller's buckets.
    pub buckets: Vec<BucketEntry>,
}

/// One `<Contents>` entry of an object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// Bucket owner.
    pub owner: Owner,
}

/// `ListBucketResult` (ListObjects v1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketResult {
    /// Bucket name.
    pub name: String,
    /// Requested prefix.
    pub prefix: String,
    /// Requested marker.
    pub marker: String,
    /// Marker for the next page, when truncated.
    pub next_marker: Option<String>,
    /// Effective entry limit.
    pub max_keys: usize,
    /// Requested delimiter.
    pub delimiter: Option<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Matching objects.
    pub contents: Vec<ObjectEntry>,
    /// Rolled-up prefixes.
    pub common_prefixes: Vec<String>,
}

/// Permission named in a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// `FULL_CONTROL`.
    FullControl,
    /// `READ`.
    Read,
    /// `WRITE`.
    Write,
}

impl Permission {
    /// Wire spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullControl => "FULL_CONTROL",
            Self::Read => "READ",
            Self::Write => "WRITE",
        }
    }
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    /// A specific account.
    CanonicalUser(Owner),
    /// A predefined group, by URI.
    Group(String),
}

/// One `<Grant>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// The grantee.
    pub grantee: Grantee,
    /// The permission granted.
    pub permission: Permission,
}

/// `AccessControlPolicy`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlPolicy {
    /// Resource owner.
    pub owner: Owner,
    /// Grants in document order.
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// The policy a canned ACL stands for: the owner always holds
    /// `FULL_CONTROL`, and `AllUsers` gets `READ` (and `WRITE`) for the public
    /// variants.
    #[must_use]
    pub fn canned(owner: Owner, public_read: bool, public_write: bool) -> Self {
        let mut grants = vec![Grant {
            grantee: Grantee::CanonicalUser(owner.clone()),
            permission: Permission::FullControl,
        }];
        if public_read {
            grants.push(Grant {
                grantee: Grantee::Group(ALL_USERS_URI.to_owned()),
                permission: Permission::Read,
            });
        }
        if public_write {
            grants.push(Grant {
                grantee: Grantee::Group(ALL_USERS_URI.to_owned()),
                permission: Permission::Write,
            });
        }
        Self { owner, grants }
    }
}

/// `InitiateMultipartUploadResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// New upload id.
    pub upload_id: String,
}

/// `CompleteMultipartUploadResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// URL path of the new object.
    pub location: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Quoted aggregate ETag.
    pub etag: String,
}

/// `CopyObjectResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyObjectResult {
    /// Quoted ETag of the destination.
    pub etag: String,
    /// Modification time of the destination.
    pub last_modified: DateTime<Utc>,
}

/// One `<Part>` of a part listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartEntry {
    /// Part number.
    pub part_number: u32,
    /// Upload time.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
}

/// `ListPartsResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPartsResult {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload id.
    pub upload_id: String,
    /// Who started the upload.
    pub initiator: Owner,
    /// Bucket owner.
    pub owner: Owner,
    /// Part limit.
    pub max_parts: u32,
    /// Whether more parts follow.
    pub is_truncated: bool,
    /// Parts in part-number order.
    pub parts: Vec<PartEntry>,
}

/// One `<Upload>` of an upload listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Object key.
    pub key: String,
    /// Upload id.
    pub upload_id: String,
    /// Who started the upload.
    pub initiator: Owner,
    /// Bucket owner.
    pub owner: Owner,
    /// Initiation time.
    pub initiated: DateTime<Utc>,
}

/// `ListMultipartUploadsResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMultipartUploadsResult {
    /// Bucket name.
    pub bucket: String,
    /// Upload limit.
    pub max_uploads: u32,
    /// Whether more uploads follow.
    pub is_truncated: bool,
    /// Uploads by key, then initiation time.
    pub uploads: Vec<UploadEntry>,
}

/// `LocationConstraint`: the bucket region as text content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationConstraint {
    /// Region name.
    pub region: String,
}

/// `<Error>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDocument {
    /// S3 error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Request path the error applies to.
    pub resource: Option<String>,
    /// Request id, matching the `x-amz-request-id` header.
    pub request_id: String,
}

/// One `<Part>` of a `CompleteMultipartUpload` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartEntry {
    /// Part number.
    pub part_number: u32,
    /// ETag as sent, quotes included.
    pub etag: String,
}

/// `CompleteMultipartUpload` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUpload {
    /// Requested parts in document order.
    pub parts: Vec<CompletedPartEntry>,
}

/// `CreateBucketConfiguration` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBucketConfiguration {
    /// Requested region.
    pub location_constraint: Option<String>,
}
