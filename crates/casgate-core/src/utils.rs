//! Shared utilities for the gateway.
//!
//! Provides ID and credential generation and copy-source parsing.

use rand::RngExt;
use uuid::Uuid;

use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Length of a generated access key.
pub const ACCESS_KEY_LEN: usize = 20;

/// Length of a generated secret key.
pub const SECRET_KEY_LEN: usize = 40;

const ACCESS_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const SECRET_KEY_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Generate a random upload ID for multipart uploads.
///
/// Produces a 64-character hex string.
///
/// # Examples
///
/// ```
/// use casgate_core::utils::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert_eq!(id.len(), 64);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// Generate a unique request ID (UUID v4 without dashes).
///
/// # Examples
///
/// ```
/// use casgate_core::utils::generate_request_id;
///
/// let id = generate_request_id();
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate a 20-character access key of uppercase letters and digits.
///
/// # Examples
///
/// ```
/// use casgate_core::utils::generate_access_key;
///
/// let key = generate_access_key();
/// assert_eq!(key.len(), 20);
/// assert!(key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
/// ```
#[must_use]
pub fn generate_access_key() -> String {
    random_string::<ACCESS_KEY_LEN>(ACCESS_KEY_ALPHABET)
}

/// Generate a 40-character secret key.
#[must_use]
pub fn generate_secret_key() -> String {
    random_string::<SECRET_KEY_LEN>(SECRET_KEY_ALPHABET)
}

fn random_string<const N: usize>(alphabet: &[u8]) -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; N];
    rng.fill(&mut buf);
    buf.iter()
        .map(|b| char::from(alphabet[usize::from(*b) % alphabet.len()]))
        .collect()
}

// ---------------------------------------------------------------------------
// Copy source parsing
// ---------------------------------------------------------------------------

/// Parse the `x-amz-copy-source` header value into bucket and key.
///
/// The header uses the format `/bucket/key` or `bucket/key`. Percent-encoded
/// characters in the key are decoded. Version selectors are refused since
/// objects are not versioned.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] if the copy source string is
/// empty or malformed, and [`ServiceError::NotImplemented`] for a
/// `versionId` selector.
///
/// # Examples
///
/// ```
/// use casgate_core::utils::parse_copy_source;
///
/// let (bucket, key) = parse_copy_source("/my-bucket/dir/my%20key").unwrap();
/// assert_eq!(bucket, "my-bucket");
/// assert_eq!(key, "dir/my key");
/// ```
pub fn parse_copy_source(source: &str) -> Result<(String, String), ServiceError> {
    let source = source.strip_prefix('/').unwrap_or(source);

    let path = match source.split_once('?') {
        Some((path, query)) => {
            if query.split('&').any(|param| param.starts_with("versionId=")) {
                return Err(ServiceError::NotImplemented(
                    "CopyObject of a specific version".to_owned(),
                ));
            }
            path
        }
        None => source,
    };

    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| ServiceError::InvalidArgument {
            message: "Invalid copy source: must be in the format bucket/key".to_owned(),
        })?;

    if bucket.is_empty() || key.is_empty() {
        return Err(ServiceError::InvalidArgument {
            message: "Invalid copy source: bucket and key must not be empty".to_owned(),
        });
    }

    let decoded_key = percent_encoding::percent_decode_str(key)
        .decode_utf8()
        .map_err(|_| ServiceError::InvalidArgument {
            message: "Invalid copy source: key contains invalid UTF-8".to_owned(),
        })?
        .into_owned();

    Ok((bucket.to_owned(), decoded_key))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_should_generate_unique_upload_ids() {
        let ids: HashSet<String> = (0..100).map(|_| generate_upload_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_should_generate_unique_request_ids() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn test_should_generate_credentials_from_their_alphabets() {
        let key = generate_access_key();
        assert_eq!(key.len(), ACCESS_KEY_LEN);
        assert!(key.bytes().all(|b| ACCESS_KEY_ALPHABET.contains(&b)));

        let secret = generate_secret_key();
        assert_eq!(secret.len(), SECRET_KEY_LEN);
        assert!(secret.bytes().all(|b| SECRET_KEY_ALPHABET.contains(&b)));
        assert_ne!(secret, generate_secret_key());
    }

    #[test]
    fn test_should_parse_copy_source_simple() {
        let (bucket, key) = parse_copy_source("my-bucket/my-key").expect("valid");
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "my-key");
    }

    #[test]
    fn test_should_parse_copy_source_with_nested_encoded_key() {
        let (bucket, key) = parse_copy_source("/b/a/b%2Bc.txt").expect("valid");
        assert_eq!(bucket, "b");
        assert_eq!(key, "a/b+c.txt");
    }

    #[test]
    fn test_should_reject_malformed_copy_sources() {
        assert!(matches!(
            parse_copy_source("bucket-only"),
            Err(ServiceError::InvalidArgument { .. })
        ));
        assert!(parse_copy_source("/key").is_err());
        assert!(parse_copy_source("bucket/").is_err());
        assert!(matches!(
            parse_copy_source("b/k?versionId=1"),
            Err(ServiceError::NotImplemented(_))
        ));
    }
}
