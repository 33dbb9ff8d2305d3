//! Request argument validation.
//!
//! Bucket names follow the
//! [Amazon S3 naming rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html);
//! object keys, user metadata and part numbers follow the S3 limits.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::ServiceError;

/// Maximum total size (in bytes) of all user-defined metadata keys and values.
const MAX_METADATA_SIZE: usize = 2048;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Highest part number of a multipart upload.
pub const MAX_PART_NUMBER: u32 = 10_000;

fn invalid_bucket(name: &str, reason: &str) -> ServiceError {
    ServiceError::InvalidBucketName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Validate a bucket name.
///
/// - 3-63 characters long
/// - only lowercase letters, numbers, hyphens and dots
/// - starts and ends with a letter or number
/// - no consecutive dots
/// - not formatted as an IPv4 address
///
/// # Errors
///
/// Returns [`ServiceError::InvalidBucketName`] naming the violated rule.
///
/// # Examples
///
/// ```
/// use casgate_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), ServiceError> {
    let len = name.len();

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(invalid_bucket(
            name,
            &format!(
                "Bucket name must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
            ),
        ));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid_bucket(
            name,
            "Bucket name must only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let first = name.as_bytes()[0];
    let last = name.as_bytes()[len - 1];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit())
        || !(last.is_ascii_lowercase() || last.is_ascii_digit())
    {
        return Err(invalid_bucket(
            name,
            "Bucket name must start and end with a letter or number",
        ));
    }

    if name.contains("..") {
        return Err(invalid_bucket(
            name,
            "Bucket name must not contain consecutive dots",
        ));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid_bucket(
            name,
            "Bucket name must not be formatted as an IP address",
        ));
    }

    Ok(())
}

/// Validate an object key: 1-1024 bytes.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] for an empty or oversized key.
///
/// # Examples
///
/// ```
/// use casgate_core::validation::validate_object_key;
///
/// assert!(validate_object_key("photos/2024/image.jpg").is_ok());
/// assert!(validate_object_key("").is_err());
/// ```
pub fn validate_object_key(key: &str) -> Result<(), ServiceError> {
    if key.is_empty() {
        return Err(ServiceError::InvalidArgument {
            message: "Object key must not be empty".to_owned(),
        });
    }

    if key.len() > MAX_KEY_BYTES {
        return Err(ServiceError::InvalidArgument {
            message: format!("Object key must not exceed {MAX_KEY_BYTES} bytes"),
        });
    }

    Ok(())
}

/// Validate user-defined metadata: keys plus values at most 2 KB.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] if the total size exceeds the
/// limit.
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), ServiceError> {
    let total_size: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

    if total_size > MAX_METADATA_SIZE {
        return Err(ServiceError::InvalidArgument {
            message: format!(
                "User-defined metadata must not exceed {MAX_METADATA_SIZE} bytes, got {total_size}"
            ),
        });
    }

    Ok(())
}

/// Validate a multipart part number: 1 to 10000.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] outside that range.
pub fn validate_part_number(part_number: u32) -> Result<(), ServiceError> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument {
            message: format!(
                "Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_valid_bucket_names() {
        for name in ["abc", "my-bucket", "my.bucket.name", "123bucket", &"a".repeat(63)] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for name in [
            "ab",
            &"a".repeat(64),
            "MyBucket",
            "my_bucket",
            "-bucket",
            "bucket.",
            "my..bucket",
            "192.168.1.1",
        ] {
            assert!(
                matches!(
                    validate_bucket_name(name),
                    Err(ServiceError::InvalidBucketName { .. })
                ),
                "{name} should be invalid"
            );
        }
    }

    #[test]
    fn test_should_bound_object_key_length() {
        assert!(validate_object_key("a").is_ok());
        assert!(validate_object_key(&"a".repeat(1024)).is_ok());
        assert!(validate_object_key(&"a".repeat(1025)).is_err());
        assert!(validate_object_key("").is_err());
    }

    #[test]
    fn test_should_bound_metadata_size() {
        let mut meta = BTreeMap::new();
        meta.insert("k".to_owned(), "v".repeat(2047));
        assert!(validate_metadata(&meta).is_ok());
        meta.insert("k2".to_owned(), "v".to_owned());
        assert!(validate_metadata(&meta).is_err());
    }

    #[test]
    fn test_should_bound_part_numbers() {
        assert!(validate_part_number(1).is_ok());
        assert!(validate_part_number(10_000).is_ok());
        assert!(validate_part_number(0).is_err());
        assert!(validate_part_number(10_001).is_err());
    }
}
