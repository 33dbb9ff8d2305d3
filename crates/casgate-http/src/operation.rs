//! The S3 operations the gateway serves.

use std::fmt;

/// An S3 operation identified from the request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    /// `GET /`.
    ListBuckets,
    /// `PUT /{bucket}`.
    CreateBucket,
    /// `HEAD /{bucket}`.
    HeadBucket,
    /// `DELETE /{bucket}`.
    DeleteBucket,
    /// `GET /{bucket}`.
    ListObjects,
    /// `GET /{bucket}?acl`.
    GetBucketAcl,
    /// `PUT /{bucket}?acl`.
    PutBucketAcl,
    /// `GET /{bucket}?location`.
    GetBucketLocation,
    /// `GET /{bucket}?uploads`.
    ListMultipartUploads,
    /// `PUT /{bucket}/{key}`.
    PutObject,
    /// `PUT /{bucket}/{key}` with `x-amz-copy-source`.
    CopyObject,
    /// `GET /{bucket}/{key}`.
    GetObject,
    /// `HEAD /{bucket}/{key}`.
    HeadObject,
    /// `DELETE /{bucket}/{key}`.
    DeleteObject,
    /// `POST /{bucket}/{key}?uploads`.
    CreateMultipartUpload,
    /// `PUT /{bucket}/{key}?partNumber&uploadId`.
    UploadPart,
    /// `GET /{bucket}/{key}?uploadId`.
    ListParts,
    /// `POST /{bucket}/{key}?uploadId`.
    CompleteMultipartUpload,
    /// `DELETE /{bucket}/{key}?uploadId`.
    AbortMultipartUpload,
}

impl S3Operation {
    /// The operation name as used in logs and AWS documentation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListBuckets => "ListBuckets",
            Self::CreateBucket => "CreateBucket",
            Self::HeadBucket => "HeadBucket",
            Self::DeleteBucket => "DeleteBucket",
            Self::ListObjects => "ListObjects",
            Self::GetBucketAcl => "GetBucketAcl",
            Self::PutBucketAcl => "PutBucketAcl",
            Self::GetBucketLocation => "GetBucketLocation",
            Self::ListMultipartUploads => "ListMultipartUploads",
            Self::PutObject => "PutObject",
            Self::CopyObject => "CopyObject",
            Self::GetObject => "GetObject",
            Self::HeadObject => "HeadObject",
            Self::DeleteObject => "DeleteObject",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::ListParts => "ListParts",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
        }
    }

    /// Whether the operation stores its request body as object content.
    #[must_use]
    pub fn stores_body(&self) -> bool {
        matches!(self, Self::PutObject | Self::UploadPart)
    }
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
