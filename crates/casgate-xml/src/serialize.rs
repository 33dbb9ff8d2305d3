//! S3 XML serialization: converting response documents to S3-compatible XML.
//!
//! Every document in [`crate::types`] that appears in a response body
//! implements [`S3Serialize`]. Root element names are fixed per document, so
//! [`to_xml`] takes them from [`S3Serialize::ROOT`].

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::error::XmlError;
use crate::types::{
    AccessControlPolicy, BucketEntry, CompleteMultipartUploadResult, CopyObjectResult, Grant,
    Grantee, InitiateMultipartUploadResult, ListAllMyBucketsResult, ListBucketResult,
    ListMultipartUploadsResult, ListPartsResult, LocationConstraint, ObjectEntry, Owner,
    PartEntry, STORAGE_CLASS_STANDARD, UploadEntry,
};

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for serializing S3 documents to XML.
///
/// Implementors write their content as child elements inside the current XML
/// context. The root element and namespace are written by [`to_xml`].
///
/// Uses `io::Result` because `quick_xml::Writer` closures require `io::Result<()>`.
pub trait S3Serialize {
    /// Root element name of the document.
    const ROOT: &'static str;

    /// Serialize this value as XML child elements into the given writer.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a document as S3-compatible XML with declaration and namespace.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
///
/// # Examples
///
/// ```
/// use casgate_xml::to_xml;
/// use casgate_xml::types::InitiateMultipartUploadResult;
///
/// let doc = InitiateMultipartUploadResult {
///     bucket: "b".to_owned(),
///     key: "k".to_owned(),
///     upload_id: "u".to_owned(),
/// };
/// let xml = String::from_utf8(to_xml(&doc).unwrap()).unwrap();
/// assert!(xml.contains("<UploadId>u</UploadId>"));
/// ```
pub fn to_xml<T: S3Serialize>(value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(T::ROOT)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

/// Format a timestamp as ISO 8601 with milliseconds and `Z` suffix.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ---------------------------------------------------------------------------
// Helper functions for writing common XML patterns
// ---------------------------------------------------------------------------

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

/// Write `<tag>text</tag>` only if the value is `Some`.
fn write_optional_text<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: Option<&str>,
) -> io::Result<()> {
    if let Some(v) = value {
        write_text_element(writer, tag, v)?;
    }
    Ok(())
}

fn write_bool<W: Write>(writer: &mut Writer<W>, tag: &str, value: bool) -> io::Result<()> {
    write_text_element(writer, tag, if value { "true" } else { "false" })
}

fn write_number<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: impl ToString,
) -> io::Result<()> {
    write_text_element(writer, tag, &value.to_string())
}

fn write_timestamp<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: &DateTime<Utc>,
) -> io::Result<()> {
    write_text_element(writer, tag, &format_timestamp(value))
}

/// Write an identity under `tag` (`Owner` or `Initiator`).
fn write_identity<W: Write>(writer: &mut Writer<W>, tag: &str, owner: &Owner) -> io::Result<()> {
    writer.create_element(tag).write_inner_content(|w| {
        write_text_element(w, "ID", &owner.id)?;
        write_text_element(w, "DisplayName", &owner.display_name)?;
        Ok(())
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Element-level writers
// ---------------------------------------------------------------------------

fn write_bucket<W: Write>(writer: &mut Writer<W>, bucket: &BucketEntry) -> io::Result<()> {
    writer.create_element("Bucket").write_inner_content(|w| {
        write_text_element(w, "Name", &bucket.name)?;
        write_timestamp(w, "CreationDate", &bucket.creation_date)?;
        Ok(())
    })?;
    Ok(())
}

fn write_object<W: Write>(writer: &mut Writer<W>, object: &ObjectEntry) -> io::Result<()> {
    writer.create_element("Contents").write_inner_content(|w| {
        write_text_element(w, "Key", &object.key)?;
        write_timestamp(w, "LastModified", &object.last_modified)?;
        write_text_element(w, "ETag", &object.etag)?;
        write_number(w, "Size", object.size)?;
        write_identity(w, "Owner", &object.owner)?;
        write_text_element(w, "StorageClass", STORAGE_CLASS_STANDARD)?;
        Ok(())
    })?;
    Ok(())
}

fn write_common_prefix<W: Write>(writer: &mut Writer<W>, prefix: &str) -> io::Result<()> {
    writer
        .create_element("CommonPrefixes")
        .write_inner_content(|w| write_text_element(w, "Prefix", prefix))?;
    Ok(())
}

fn write_grant<W: Write>(writer: &mut Writer<W>, grant: &Grant) -> io::Result<()> {
    writer.create_element("Grant").write_inner_content(|w| {
        let grantee = w
            .create_element("Grantee")
            .with_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        match &grant.grantee {
            Grantee::CanonicalUser(owner) => {
                grantee
                    .with_attribute(("xsi:type", "CanonicalUser"))
                    .write_inner_content(|w| {
                        write_text_element(w, "ID", &owner.id)?;
                        write_text_element(w, "DisplayName", &owner.display_name)?;
                        Ok(())
                    })?;
            }
            Grantee::Group(uri) => {
                grantee
                    .with_attribute(("xsi:type", "Group"))
                    .write_inner_content(|w| write_text_element(w, "URI", uri))?;
            }
        }
        write_text_element(w, "Permission", grant.permission.as_str())?;
        Ok(())
    })?;
    Ok(())
}

fn write_part<W: Write>(writer: &mut Writer<W>, part: &PartEntry) -> io::Result<()> {
    writer.create_element("Part").write_inner_content(|w| {
        write_number(w, "PartNumber", part.part_number)?;
        write_timestamp(w, "LastModified", &part.last_modified)?;
        write_text_element(w, "ETag", &part.etag)?;
        write_number(w, "Size", part.size)?;
        Ok(())
    })?;
    Ok(())
}

fn write_upload<W: Write>(writer: &mut Writer<W>, upload: &UploadEntry) -> io::Result<()> {
    writer.create_element("Upload").write_inner_content(|w| {
        write_text_element(w, "Key", &upload.key)?;
        write_text_element(w, "UploadId", &upload.upload_id)?;
        write_identity(w, "Initiator", &upload.initiator)?;
        write_identity(w, "Owner", &upload.owner)?;
        write_text_element(w, "StorageClass", STORAGE_CLASS_STANDARD)?;
        write_timestamp(w, "Initiated", &upload.initiated)?;
        Ok(())
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

impl S3Serialize for ListAllMyBucketsResult {
    const ROOT: &'static str = "ListAllMyBucketsResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_identity(writer, "Owner", &self.owner)?;
        writer.create_element("Buckets").write_inner_content(|w| {
            for bucket in &self.buckets {
                write_bucket(w, bucket)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ListBucketResult {
    const ROOT: &'static str = "ListBucketResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Name", &self.name)?;
        write_text_element(writer, "Prefix", &self.prefix)?;
        write_text_element(writer, "Marker", &self.marker)?;
        write_optional_text(writer, "NextMarker", self.next_marker.as_deref())?;
        write_number(writer, "MaxKeys", self.max_keys)?;
        write_optional_text(writer, "Delimiter", self.delimiter.as_deref())?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for object in &self.contents {
            write_object(writer, object)?;
        }
        for prefix in &self.common_prefixes {
            write_common_prefix(writer, prefix)?;
        }
        Ok(())
    }
}

impl S3Serialize for AccessControlPolicy {
    const ROOT: &'static str = "AccessControlPolicy";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_identity(writer, "Owner", &self.owner)?;
        writer
            .create_element("AccessControlList")
            .write_inner_content(|w| {
                for grant in &self.grants {
                    write_grant(w, grant)?;
                }
                Ok(())
            })?;
        Ok(())
    }
}

impl S3Serialize for InitiateMultipartUploadResult {
    const ROOT: &'static str = "InitiateMultipartUploadResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)?;
        Ok(())
    }
}

impl S3Serialize for CompleteMultipartUploadResult {
    const ROOT: &'static str = "CompleteMultipartUploadResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Location", &self.location)?;
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "ETag", &self.etag)?;
        Ok(())
    }
}

impl S3Serialize for CopyObjectResult {
    const ROOT: &'static str = "CopyObjectResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_timestamp(writer, "LastModified", &self.last_modified)?;
        write_text_element(writer, "ETag", &self.etag)?;
        Ok(())
    }
}

impl S3Serialize for ListPartsResult {
    const ROOT: &'static str = "ListPartsResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)?;
        write_identity(writer, "Initiator", &self.initiator)?;
        write_identity(writer, "Owner", &self.owner)?;
        write_text_element(writer, "StorageClass", STORAGE_CLASS_STANDARD)?;
        write_number(writer, "MaxParts", self.max_parts)?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for part in &self.parts {
            write_part(writer, part)?;
        }
        Ok(())
    }
}

impl S3Serialize for ListMultipartUploadsResult {
    const ROOT: &'static str = "ListMultipartUploadsResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_number(writer, "MaxUploads", self.max_uploads)?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for upload in &self.uploads {
            write_upload(writer, upload)?;
        }
        Ok(())
    }
}

impl S3Serialize for LocationConstraint {
    const ROOT: &'static str = "LocationConstraint";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.write_event(Event::Text(BytesText::new(&self.region)))?;
        Ok(())
    }
}
