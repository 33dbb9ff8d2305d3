//! Persisted records and the metadata key layout.
//!
//! Every record is a JSON document in the [`crate::store::MetadataStore`]:
//!
//! - [`BucketRecord`] under `bucket/<name>`
//! - [`ObjectRecord`] under `object/<bucket>/<name>`
//! - [`MultipartRecord`] under `multipart/<upload_id>`
//! - [`AccessKeyRecord`] under `accesskey/<key>`
//! - [`BlobRefRecord`] under `blobref/<cid>`

pub(crate) mod access_key;
pub(crate) mod blobref;
pub(crate) mod bucket;
pub(crate) mod multipart;
pub(crate) mod object;

pub use access_key::AccessKeyRecord;
pub use blobref::BlobRefRecord;
pub use bucket::BucketRecord;
pub use multipart::{CompletedPart, MultipartRecord, PartRecord};
pub use object::{MetadataDirective, ObjectMeta, ObjectRecord};

/// Prefix of all bucket records.
pub const BUCKET_PREFIX: &str = "bucket/";

/// Prefix of all multipart upload records.
pub const UPLOAD_PREFIX: &str = "multipart/";

/// Prefix of all access-key records.
pub const ACCESS_KEY_PREFIX: &str = "accesskey/";

/// Metadata key of a bucket record.
#[must_use]
pub fn bucket_key(name: &str) -> String {
    format!("{BUCKET_PREFIX}{name}")
}

/// Metadata key of an object record.
#[must_use]
pub fn object_key(bucket: &str, name: &str) -> String {
    format!("object/{bucket}/{name}")
}

/// Prefix of every object record in `bucket`.
#[must_use]
pub fn object_prefix(bucket: &str) -> String {
    format!("object/{bucket}/")
}

/// Metadata key of a multipart upload record.
#[must_use]
pub fn upload_key(upload_id: &str) -> String {
    format!("{UPLOAD_PREFIX}{upload_id}")
}

/// Metadata key of an access-key record.
#[must_use]
pub fn access_key_key(key: &str) -> String {
    format!("{ACCESS_KEY_PREFIX}{key}")
}

/// Metadata key of a blob reference count.
#[must_use]
pub fn blobref_key(cid: &str) -> String {
    format!("blobref/{cid}")
}

/// Lock path of an object: `bucket/name`.
#[must_use]
pub fn object_lock_path(bucket: &str, name: &str) -> String {
    format!("{bucket}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_lay_out_metadata_keys() {
        assert_eq!(bucket_key("photos"), "bucket/photos");
        assert_eq!(object_key("photos", "a/b.jpg"), "object/photos/a/b.jpg");
        assert!(object_key("photos", "x").starts_with(&object_prefix("photos")));
        assert_eq!(upload_key("abc"), "multipart/abc");
        assert_eq!(access_key_key("AK"), "accesskey/AK");
        assert_eq!(blobref_key("cid"), "blobref/cid");
    }

    #[test]
    fn test_should_not_confuse_bucket_prefixes() {
        // "photos" must not match records of "photos2".
        assert!(!object_key("photos2", "x").starts_with(&object_prefix("photos")));
    }
}
