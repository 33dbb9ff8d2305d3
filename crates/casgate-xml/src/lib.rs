//! S3 XML documents for casgate.
//!
//! S3 uses the RestXml protocol with `noErrorWrapping: true`. This crate holds
//! the wire-level document types and their hand-written quick-xml codecs.
//!
//! # Key components
//!
//! - [`types`]: the response and request documents the gateway speaks
//! - [`S3Serialize`] and [`to_xml`] for response bodies
//! - [`S3Deserialize`] and [`from_xml`] for request bodies
//! - [`error_to_xml`] for `<Error>` documents
//!
//! # S3 XML conventions
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Booleans: lowercase `true`/`false`
//! - Timestamps: ISO 8601 format (`2006-02-03T16:45:09.000Z`)
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

pub mod deserialize;
pub mod error;
pub mod serialize;
pub mod types;

pub use deserialize::{S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3_NAMESPACE, S3Serialize, format_timestamp, to_xml};
