//! Object records and the request metadata that shapes them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::Acl;
use crate::error::ServiceError;

/// Header-derived metadata applied to a new object.
///
/// Captured by `PutObject`, `CopyObject` with `REPLACE`, and
/// `CreateMultipartUpload` (where it waits in the upload record until
/// completion).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Canned ACL of the object.
    #[serde(default)]
    pub acl: Acl,
    /// `Content-Type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Encoding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Expires`, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// `x-amz-meta-*` pairs with the prefix stripped.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_metadata: BTreeMap<String, String>,
}

/// An object: the mapping from `(bucket, name)` to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Owning bucket.
    pub bucket: String,
    /// Object key.
    pub name: String,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Content length in bytes.
    pub size: u64,
    /// Unquoted ETag.
    pub etag: String,
    /// Content identifier in the blob store.
    pub cid: String,
    /// Canned ACL.
    #[serde(default)]
    pub acl: Acl,
    /// `Content-Type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Encoding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Expires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// Always empty: versioning is not supported.
    #[serde(default)]
    pub version_id: String,
    /// Always true without versioning.
    pub is_latest: bool,
    /// Always false without versioning.
    #[serde(default)]
    pub delete_marker: bool,
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectRecord {
    /// A record for freshly stored content, modified now.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        name: impl Into<String>,
        cid: String,
        etag: String,
        size: u64,
        meta: ObjectMeta,
    ) -> Self {
        let ObjectMeta {
            acl,
            content_type,
            content_encoding,
            expires,
            user_metadata,
        } = meta;
        Self {
            bucket: bucket.into(),
            name: name.into(),
            mod_time: Utc::now(),
            size,
            etag,
            cid,
            acl,
            content_type,
            content_encoding,
            expires,
            version_id: String::new(),
            is_latest: true,
            delete_marker: false,
            user_metadata,
        }
    }

    /// The header metadata of this record.
    #[must_use]
    pub fn meta(&self) -> ObjectMeta {
        ObjectMeta {
            acl: self.acl,
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            expires: self.expires.clone(),
            user_metadata: self.user_metadata.clone(),
        }
    }

    /// The `Content-Type` to serve, defaulting to `binary/octet-stream`.
    #[must_use]
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or("binary/octet-stream")
    }
}

/// `x-amz-metadata-directive` of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDirective {
    /// Keep the source's metadata.
    #[default]
    Copy,
    /// Take the metadata from the copy request.
    Replace,
}

impl fmt::Display for MetadataDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("COPY"),
            Self::Replace => f.write_str("REPLACE"),
        }
    }
}

impl FromStr for MetadataDirective {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COPY" => Ok(Self::Copy),
            "REPLACE" => Ok(Self::Replace),
            other => Err(ServiceError::InvalidArgument {
                message: format!("Unknown metadata directive: {other}"),
            }),
        }
    }
}
