//! S3 XML deserialization: parsing request bodies.
//!
//! Only two request documents carry XML: `CompleteMultipartUpload` and the
//! optional `CreateBucketConfiguration`. Unknown elements are skipped.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::XmlError;
use crate::types::{CompleteMultipartUpload, CompletedPartEntry, CreateBucketConfiguration};

/// Trait for deserializing S3 documents from XML.
///
/// The root element has already been consumed by the caller; the
/// implementation reads child elements until the matching end tag.
pub trait S3Deserialize: Sized {
    /// Deserialize an instance from the given XML reader.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Deserialize S3-compatible XML into a typed value.
///
/// # Errors
///
/// Returns `XmlError` if the XML is malformed or deserialization fails.
///
/// # Examples
///
/// ```
/// use casgate_xml::from_xml;
/// use casgate_xml::types::CompleteMultipartUpload;
///
/// let body = b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber>\
///              <ETag>\"abc\"</ETag></Part></CompleteMultipartUpload>";
/// let doc: CompleteMultipartUpload = from_xml(body).unwrap();
/// assert_eq!(doc.parts[0].part_number, 1);
/// ```
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(_) => {
                return T::deserialize_xml(&mut reader);
            }
            Event::Eof => {
                return Err(XmlError::MissingElement("root element".to_owned()));
            }
            // Declaration, comments, processing instructions.
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions for reading common XML patterns
// ---------------------------------------------------------------------------

/// Read the text content of the current element and consume its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            // Entity and character references arrive as their own events.
            Event::GeneralRef(e) => {
                let name = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?
                {
                    text.push(ch);
                } else if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name)
                {
                    text.push_str(resolved);
                } else {
                    return Err(XmlError::ParseError(format!("unknown entity &{name};")));
                }
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Visit each child element of the current element by local name.
///
/// `visit` must consume the child (read its text or skip it).
fn for_each_child(
    reader: &mut Reader<&[u8]>,
    context: &str,
    mut visit: impl FnMut(&mut Reader<&[u8]>, &str) -> Result<(), XmlError>,
) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                let tag_name = std::str::from_utf8(name.as_ref())
                    .map_err(|e| XmlError::ParseError(e.to_string()))?
                    .to_owned();
                visit(reader, &tag_name)?;
            }
            Event::End(_) => return Ok(()),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(format!(
                    "unexpected EOF in {context}"
                )));
            }
            _ => {}
        }
    }
}

impl S3Deserialize for CompletedPartEntry {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut part_number = None;
        let mut etag = None;

        for_each_child(reader, "Part", |reader, tag| {
            match tag {
                "PartNumber" => {
                    let text = read_text_content(reader)?;
                    let number = text.trim().parse::<u32>().map_err(|e| {
                        XmlError::ParseError(format!("invalid PartNumber '{text}': {e}"))
                    })?;
                    part_number = Some(number);
                }
                "ETag" => etag = Some(read_text_content(reader)?),
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;

        Ok(Self {
            part_number: part_number
                .ok_or_else(|| XmlError::MissingElement("PartNumber".to_owned()))?,
            etag: etag.ok_or_else(|| XmlError::MissingElement("ETag".to_owned()))?,
        })
    }
}

impl S3Deserialize for CompleteMultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut parts = Vec::new();
        for_each_child(reader, "CompleteMultipartUpload", |reader, tag| {
            if tag == "Part" {
                parts.push(CompletedPartEntry::deserialize_xml(reader)?);
            } else {
                skip_element(reader)?;
            }
            Ok(())
        })?;
        Ok(Self { parts })
    }
}

impl S3Deserialize for CreateBucketConfiguration {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut location_constraint = None;
        for_each_child(reader, "CreateBucketConfiguration", |reader, tag| {
            if tag == "LocationConstraint" {
                let text = read_text_content(reader)?;
                location_constraint = Some(text).filter(|t| !t.is_empty());
            } else {
                skip_element(reader)?;
            }
            Ok(())
        })?;
        Ok(Self {
            location_constraint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_deserialize_completed_multipart_upload() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
        <CompleteMultipartUpload xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
            <Part>
                <PartNumber>1</PartNumber>
                <ETag>"etag1"</ETag>
                <ChecksumCRC32>ignored</ChecksumCRC32>
            </Part>
            <Part>
                <ETag>&quot;etag2&quot;</ETag>
                <PartNumber>2</PartNumber>
            </Part>
        </CompleteMultipartUpload>"#;

        let doc: CompleteMultipartUpload = from_xml(xml).expect("deserialization should succeed");
        assert_eq!(doc.parts.len(), 2);
        assert_eq!(doc.parts[0].part_number, 1);
        assert_eq!(doc.parts[0].etag, "\"etag1\"");
        assert_eq!(doc.parts[1].part_number, 2);
        assert_eq!(doc.parts[1].etag, "\"etag2\"");
    }

    #[test]
    fn test_should_accept_empty_part_list() {
        let doc: CompleteMultipartUpload =
            from_xml(b"<CompleteMultipartUpload></CompleteMultipartUpload>").expect("parse");
        assert!(doc.parts.is_empty());
    }

    #[test]
    fn test_should_reject_malformed_parts() {
        let bad_number = b"<CompleteMultipartUpload><Part><PartNumber>one</PartNumber>\
            <ETag>x</ETag></Part></CompleteMultipartUpload>";
        assert!(matches!(
            from_xml::<CompleteMultipartUpload>(bad_number),
            Err(XmlError::ParseError(_))
        ));

        let missing_etag =
            b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber></Part></CompleteMultipartUpload>";
        assert!(matches!(
            from_xml::<CompleteMultipartUpload>(missing_etag),
            Err(XmlError::MissingElement(_))
        ));

        let truncated = b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber>";
        assert!(from_xml::<CompleteMultipartUpload>(truncated).is_err());
        assert!(from_xml::<CompleteMultipartUpload>(b"").is_err());
    }

    #[test]
    fn test_should_deserialize_create_bucket_configuration() {
        let xml = br#"<CreateBucketConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
            <LocationConstraint>eu-west-1</LocationConstraint>
        </CreateBucketConfiguration>"#;
        let config: CreateBucketConfiguration = from_xml(xml).expect("parse");
        assert_eq!(config.location_constraint.as_deref(), Some("eu-west-1"));

        let empty: CreateBucketConfiguration = from_xml(
            b"<CreateBucketConfiguration><LocationConstraint></LocationConstraint></CreateBucketConfiguration>",
        )
        .expect("parse");
        assert!(empty.location_constraint.is_none());
    }
}
