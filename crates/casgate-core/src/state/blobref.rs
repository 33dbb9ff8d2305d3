//! Blob reference counts.

use serde::{Deserialize, Serialize};

/// How many object and part records point at one cid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRefRecord {
    /// Live references.
    pub refs: u64,
}
