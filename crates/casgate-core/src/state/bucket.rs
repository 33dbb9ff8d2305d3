//! Bucket records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::Acl;

/// A bucket.
///
/// Created by `CreateBucket`; only the ACL changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    /// Globally unique bucket name.
    pub name: String,
    /// Region the bucket was created in.
    pub region: String,
    /// Access key of the creator.
    pub owner: String,
    /// Canned ACL.
    pub acl: Acl,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl BucketRecord {
    /// Create a bucket record stamped with the current time.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        owner: impl Into<String>,
        acl: Acl,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            owner: owner.into(),
            acl,
            created: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_bucket_in_camel_case() {
        let record = BucketRecord::new("photos", "us-east-1", "AK1", Acl::PublicRead);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["acl"], "public-read");
        assert_eq!(json["owner"], "AK1");

        let back: BucketRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, record);
    }
}
