//! Access-key records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A credential pair with its lifecycle flags.
///
/// Records are never physically removed; `delete` only sets `is_deleted`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyRecord {
    /// The public access key id.
    pub key: String,
    /// The shared signing secret.
    pub secret: String,
    /// Whether the key may sign requests.
    pub enable: bool,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl AccessKeyRecord {
    /// A fresh enabled record.
    #[must_use]
    pub fn new(key: String, secret: String) -> Self {
        let now = Utc::now();
        Self {
            key,
            secret,
            enable: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Debug for AccessKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyRecord")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .field("enable", &self.enable)
            .field("is_deleted", &self.is_deleted)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
