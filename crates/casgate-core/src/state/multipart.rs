//! Multipart upload records.
//!
//! A [`MultipartRecord`] is created empty by `CreateMultipartUpload`,
//! accumulates [`PartRecord`]s, and is deleted on completion or abort.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::ObjectMeta;

/// An in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartRecord {
    /// Target bucket.
    pub bucket: String,
    /// Target object key.
    pub object: String,
    /// Unique upload id.
    pub upload_id: String,
    /// Metadata applied to the object on completion.
    pub metadata: ObjectMeta,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Access key of the initiator.
    pub initiator: String,
    /// Uploaded parts keyed by part number.
    #[serde(default)]
    pub parts: BTreeMap<u32, PartRecord>,
}

impl MultipartRecord {
    /// A fresh upload without parts.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        object: impl Into<String>,
        upload_id: String,
        initiator: String,
        metadata: ObjectMeta,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            upload_id,
            metadata,
            initiated: Utc::now(),
            initiator,
            parts: BTreeMap::new(),
        }
    }

    /// Whether this upload targets `bucket/object`.
    #[must_use]
    pub fn targets(&self, bucket: &str, object: &str) -> bool {
        self.bucket == bucket && self.object == object
    }

    /// Insert or replace a part, returning the replaced one.
    pub fn put_part(&mut self, part: PartRecord) -> Option<PartRecord> {
        self.parts.insert(part.number, part)
    }

    /// Parts in ascending part-number order.
    pub fn parts(&self) -> impl Iterator<Item = &PartRecord> {
        self.parts.values()
    }
}

/// One uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// 1-based part number.
    pub number: u32,
    /// Unquoted ETag of the part content.
    pub etag: String,
    /// Content identifier in the blob store.
    pub cid: String,
    /// Size in bytes.
    pub size: u64,
    /// Upload time.
    pub mod_time: DateTime<Utc>,
}

impl PartRecord {
    /// A part uploaded now.
    #[must_use]
    pub fn new(number: u32, etag: String, cid: String, size: u64) -> Self {
        Self {
            number,
            etag,
            cid,
            size,
            mod_time: Utc::now(),
        }
    }
}

/// A part as named in a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// ETag as sent by the client, quotes allowed.
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> MultipartRecord {
        MultipartRecord::new("b", "k", "u1".to_owned(), "AK".to_owned(), ObjectMeta::default())
    }

    #[test]
    fn test_should_replace_part_with_same_number() {
        let mut upload = upload();
        assert!(upload.put_part(PartRecord::new(1, "e1".to_owned(), "c1".to_owned(), 3)).is_none());
        let replaced = upload
            .put_part(PartRecord::new(1, "e2".to_owned(), "c2".to_owned(), 4))
            .expect("replaced");
        assert_eq!(replaced.cid, "c1");
        assert_eq!(upload.parts().count(), 1);
    }

    #[test]
    fn test_should_order_parts_and_survive_json() {
        let mut upload = upload();
        upload.put_part(PartRecord::new(3, "e3".to_owned(), "c3".to_owned(), 1));
        upload.put_part(PartRecord::new(1, "e1".to_owned(), "c1".to_owned(), 1));

        let raw = serde_json::to_vec(&upload).expect("serialize");
        let back: MultipartRecord = serde_json::from_slice(&raw).expect("deserialize");
        let numbers: Vec<u32> = back.parts().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(back.targets("b", "k"));
        assert!(!back.targets("b", "other"));
    }
}
