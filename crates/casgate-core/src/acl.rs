//! Access control: principals, canned ACLs and the permission table.
//!
//! A request is allowed when the caller's [`Role`] relative to the bucket owner,
//! the bucket's [`Acl`] and the [`Access`] class of the [`Action`] line up in
//! [`is_allowed`]. Objects may additionally be opened for reading by their own
//! ACL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// No credentials were presented.
    Anonymous,
    /// A verified access key.
    Key(String),
}

impl Principal {
    /// The access key, if authenticated.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Key(key) => Some(key),
        }
    }

    /// The caller's role against a resource owned by `owner`.
    #[must_use]
    pub fn role(&self, owner: &str) -> Role {
        match self {
            Self::Anonymous => Role::Anonymous,
            Self::Key(key) if key == owner => Role::Owner,
            Self::Key(_) => Role::Authenticated,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// The caller's relationship to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The access key that created the bucket.
    Owner,
    /// Any other verified access key.
    Authenticated,
    /// An unauthenticated caller.
    Anonymous,
}

/// Canned ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    /// Owner only.
    #[default]
    Private,
    /// Everyone may read.
    PublicRead,
    /// Everyone may read and write.
    PublicReadWrite,
}

impl Acl {
    /// The `x-amz-acl` spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
        }
    }

    /// Whether anyone may read.
    #[must_use]
    pub fn is_public_read(&self) -> bool {
        matches!(self, Self::PublicRead | Self::PublicReadWrite)
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            other => Err(ServiceError::InvalidArgument {
                message: format!("unsupported canned ACL {other:?}"),
            }),
        }
    }
}

/// Permission class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Reads bucket listings or object content.
    Read,
    /// Creates, replaces or removes objects and uploads.
    Write,
    /// Changes or destroys the bucket itself.
    Admin,
}

/// Bucket-scoped actions checked against the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// HEAD bucket.
    HeadBucket,
    /// GET bucket.
    ListObjects,
    /// GET bucket?location.
    GetBucketLocation,
    /// GET bucket?uploads.
    ListMultipartUploads,
    /// GET bucket?acl.
    GetBucketAcl,
    /// PUT bucket?acl.
    PutBucketAcl,
    /// DELETE bucket.
    DeleteBucket,
    /// GET/HEAD object.
    GetObject,
    /// PUT object, or the destination of a copy.
    PutObject,
    /// DELETE object.
    DeleteObject,
    /// POST object?uploads.
    CreateMultipartUpload,
    /// PUT object?partNumber&uploadId.
    UploadPart,
    /// GET object?uploadId.
    ListParts,
    /// POST object?uploadId.
    CompleteMultipartUpload,
    /// DELETE object?uploadId.
    AbortMultipartUpload,
}

impl Action {
    /// The permission class this action requires.
    #[must_use]
    pub fn access(&self) -> Access {
        match self {
            Self::HeadBucket
            | Self::ListObjects
            | Self::GetBucketLocation
            | Self::ListMultipartUploads
            | Self::GetObject
            | Self::ListParts => Access::Read,
            Self::PutObject
            | Self::DeleteObject
            | Self::CreateMultipartUpload
            | Self::UploadPart
            | Self::CompleteMultipartUpload
            | Self::AbortMultipartUpload => Access::Write,
            Self::GetBucketAcl | Self::PutBucketAcl | Self::DeleteBucket => Access::Admin,
        }
    }
}

/// The permission table.
#[must_use]
#[allow(clippy::match_same_arms)]
pub fn is_allowed(role: Role, acl: Acl, access: Access) -> bool {
    match (role, acl, access) {
        (Role::Owner, _, _) => true,
        (Role::Authenticated | Role::Anonymous, _, Access::Admin) => false,
        (Role::Authenticated | Role::Anonymous, Acl::Private, _) => false,
        (Role::Authenticated | Role::Anonymous, Acl::PublicRead, Access::Read) => true,
        (Role::Authenticated | Role::Anonymous, Acl::PublicRead, Access::Write) => false,
        (
            Role::Authenticated | Role::Anonymous,
            Acl::PublicReadWrite,
            Access::Read | Access::Write,
        ) => {
            true
        }
    }
}

/// Check `action` on a bucket owned by `owner` with ACL `acl`.
///
/// # Errors
///
/// Returns [`ServiceError::AccessDenied`].
pub fn authorize(
    principal: &Principal,
    owner: &str,
    acl: Acl,
    action: Action,
) -> Result<(), ServiceError> {
    if is_allowed(principal.role(owner), acl, action.access()) {
        Ok(())
    } else {
        Err(ServiceError::AccessDenied)
    }
}

/// Only authenticated callers may create buckets.
///
/// # Errors
///
/// Returns [`ServiceError::AccessDenied`] for anonymous callers.
pub fn authorize_create_bucket(principal: &Principal) -> Result<(), ServiceError> {
    match principal {
        Principal::Anonymous => Err(ServiceError::AccessDenied),
        Principal::Key(_) => Ok(()),
    }
}
