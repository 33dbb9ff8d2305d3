//! Bucket, object and multipart services of the casgate S3 gateway.
//!
//! casgate speaks the S3 API in front of a content-addressed blob store. Object
//! bytes are stored once per distinct content and referenced by cid from
//! object and part records; a reference count per cid decides when content can
//! be reclaimed.
//!
//! # Architecture
//!
//! ```text
//! casgate-http (routing, SigV4, XML)
//!        |
//!        v
//!   CasGateway (ops::*, ACL checks, resource locks)
//!        |
//!        +--> MetadataStore (bucket/, object/, multipart/, accesskey/, blobref/)
//!        |
//!        +--> BlobStore (cid -> bytes)
//! ```

pub mod access_key;
pub mod acl;
pub mod config;
pub mod error;
pub mod etag;
pub mod lock;
pub mod ops;
pub mod provider;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::GatewayConfig;
pub use error::{S3ErrorCode, ServiceError, ServiceResult};
pub use ops::list::{ListObjectsOutput, ListObjectsQuery};
pub use ops::object::GetObjectOutput;
pub use provider::CasGateway;
